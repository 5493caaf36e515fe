use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

/// Known room identifiers.
///
/// Membership is exact and case sensitive. Rooms are never removed.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashSet<String>>,
}

impl RoomRegistry {
    pub fn with_rooms<I, S>(rooms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rooms: RwLock::new(rooms.into_iter().map(Into::into).collect()),
        }
    }

    /// Adds the room if absent. Returns `true` when the room is new.
    pub fn register(&self, room_id: &str) -> bool {
        let mut rooms = self
            .rooms
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if rooms.contains(room_id) {
            false
        } else {
            rooms.insert(room_id.to_owned())
        }
    }

    pub fn exists(&self, room_id: &str) -> bool {
        self.rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(room_id)
    }

    pub fn list_all(&self) -> Vec<String> {
        let mut rooms: Vec<String> = self
            .rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();
        rooms.sort();
        rooms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn register_is_idempotent() {
        // Arrange
        let registry = RoomRegistry::default();

        // Act
        let first = registry.register("R1");
        let second = registry.register("R1");

        // Assert
        assert!(first);
        assert!(!second);
        assert_eq!(registry.list_all(), vec!["R1".to_owned()]);
    }

    #[test]
    fn exists_is_case_sensitive() {
        // Arrange
        let registry = RoomRegistry::with_rooms(["Room"]);

        // Act & Assert
        assert!(registry.exists("Room"));
        assert!(!registry.exists("room"));
        assert!(!registry.exists("Room "));
    }

    #[test]
    fn concurrent_registration() {
        // Arrange
        let registry = Arc::new(RoomRegistry::default());

        // Act
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        registry.register(&format!("room-{}", (n * 50 + i) % 100));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        // Assert
        assert_eq!(registry.list_all().len(), 100);
    }
}
