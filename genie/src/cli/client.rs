use clap::ArgMatches;
use client::{DownloadParams, SearchParams, UploadParams};

fn one(matches: &ArgMatches, id: &str) -> String {
    matches.get_one::<String>(id).cloned().unwrap_or_default()
}

pub async fn upload(matches: &ArgMatches) {
    let params = UploadParams {
        uri: one(matches, "uri"),
        room: one(matches, "room"),
        files: matches
            .get_many::<String>("file")
            .map(|files| files.cloned().collect())
            .unwrap_or_default(),
    };
    client::upload_photos(params).await;
}

pub async fn search(matches: &ArgMatches) {
    let params = SearchParams {
        uri: one(matches, "uri"),
        room: one(matches, "room"),
        photo: one(matches, "file"),
    };
    client::search(params).await;
}

pub async fn list_rooms(matches: &ArgMatches) {
    client::list_rooms(&one(matches, "uri")).await;
}

pub async fn check_room(matches: &ArgMatches) {
    client::check_room(&one(matches, "uri"), &one(matches, "room")).await;
}

pub async fn download(matches: &ArgMatches) {
    let params = DownloadParams {
        uri: one(matches, "uri"),
        room: one(matches, "room"),
        cluster: one(matches, "cluster"),
        output: matches.get_one::<String>("output").cloned(),
    };
    client::download_cluster(params).await;
}
