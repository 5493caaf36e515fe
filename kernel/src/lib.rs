#![warn(clippy::unwrap_in_result)]
#![warn(clippy::unwrap_used)]

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Every room identifier the service currently knows about.
///
/// Rooms are registered on the first successful upload and live for the
/// lifetime of the server process.
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct RoomList {
    /// Room identifiers, sorted
    pub rooms: Vec<String>,
}

/// Answer of a room membership check.
#[derive(Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct RoomStatus {
    /// Whether the room has been registered
    pub exists: bool,
}

/// Body of a room membership check.
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckRoomRequest {
    /// Room identifier to look up; a missing identifier never exists
    #[serde(default)]
    pub room_id: Option<String>,
}

impl CheckRoomRequest {
    #[must_use]
    pub fn new(room_id: &str) -> Self {
        Self {
            room_id: Some(room_id.to_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_room_request_uses_camel_case() {
        // Arrange
        let request = CheckRoomRequest::new("R1");

        // Act
        let json = serde_json::to_string(&request).unwrap();

        // Assert
        assert_eq!(json, r#"{"roomId":"R1"}"#);
    }

    #[test]
    fn check_room_request_without_room() {
        // Arrange
        let json = "{}";

        // Act
        let request: CheckRoomRequest = serde_json::from_str(json).unwrap();

        // Assert
        assert!(request.room_id.is_none());
    }
}
