pub mod bugreport;
pub mod client;
pub mod server;
pub mod version;

pub const SERVER_SUBCOMMAND: &str = "server";
pub const SERVER_DESCRIPTION: &str = "Run the room server, configured by GENIE_* variables";

pub const VERSION_SUBCOMMAND: &str = "version";
pub const VERSION_DESCRIPTION: &str = "Display the version and build information";

pub const BUGREPORT_SUBCOMMAND: &str = "bugreport";
pub const BUGREPORT_DESCRIPTION: &str = "Collect system and environment details for a bug report";

pub const UPLOAD_SUBCOMMAND: &str = "upload";
pub const UPLOAD_DESCRIPTION: &str = "Upload photos into a room and cluster them";

pub const SEARCH_SUBCOMMAND: &str = "search";
pub const SEARCH_DESCRIPTION: &str = "Find the cluster matching a reference photo";

pub const ROOMS_SUBCOMMAND: &str = "rooms";
pub const ROOMS_DESCRIPTION: &str = "List all known rooms";

pub const CHECK_SUBCOMMAND: &str = "check";
pub const CHECK_DESCRIPTION: &str = "Check whether a room exists";

pub const DOWNLOAD_SUBCOMMAND: &str = "download";
pub const DOWNLOAD_DESCRIPTION: &str = "Download a cluster as a zip archive";
