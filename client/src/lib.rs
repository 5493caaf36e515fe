use std::path::{Path, PathBuf};

use comfy_table::{presets::UTF8_HORIZONTAL_ONLY, Attribute, Cell, ContentArrangement, Table};
use futures::StreamExt;
use kernel::{CheckRoomRequest, RoomList, RoomStatus};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use resource::Resource;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

pub mod resource;

pub struct UploadParams {
    pub uri: String,
    pub room: String,
    pub files: Vec<String>,
}

pub struct SearchParams {
    pub uri: String,
    pub room: String,
    pub photo: String,
}

pub struct DownloadParams {
    pub uri: String,
    pub room: String,
    pub cluster: String,
    pub output: Option<String>,
}

/// Uploads photos into a room, which triggers clustering on the server.
pub async fn upload_photos(params: UploadParams) {
    let Some(resource) = endpoint(&params.uri, &["upload"]) else {
        return;
    };

    let mut form = Form::new().text("roomId", params.room.clone());
    for file in &params.files {
        match file_part(file).await {
            Ok(part) => form = form.part("photos", part),
            Err(e) => {
                println!("cannot read {file}: {e}");
                return;
            }
        }
    }

    let result = Client::new()
        .post(resource.to_string())
        .multipart(form)
        .send()
        .await;
    let count = params.files.len();
    let what = format!("{count} photo(s) uploaded into {}", params.room);
    print_reply(result, &what).await;
}

/// Searches a room for the cluster matching a reference photo.
pub async fn search(params: SearchParams) {
    let Some(resource) = endpoint(&params.uri, &["search"]) else {
        return;
    };

    let part = match file_part(&params.photo).await {
        Ok(part) => part,
        Err(e) => {
            println!("cannot read {}: {e}", params.photo);
            return;
        }
    };
    let form = Form::new()
        .text("roomId", params.room.clone())
        .part("photo", part);

    let result = Client::new()
        .post(resource.to_string())
        .multipart(form)
        .send()
        .await;
    print_reply(result, &format!("search in {}", params.room)).await;
}

pub async fn list_rooms(uri: &str) {
    let Some(resource) = endpoint(uri, &["rooms"]) else {
        return;
    };

    match Client::new().get(resource.to_string()).send().await {
        Ok(response) => match response.json::<RoomList>().await {
            Ok(r) => {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_HORIZONTAL_ONLY)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_width(120)
                    .set_header(vec![Cell::new("Room").add_attribute(Attribute::Bold)]);

                for room in r.rooms {
                    table.add_row(vec![Cell::new(room)]);
                }
                println!("{table}");
            }
            Err(e) => println!("JSON decode error: {e}"),
        },
        Err(e) => {
            println!("error: {e}");
        }
    }
}

pub async fn check_room(uri: &str, room: &str) {
    let Some(resource) = endpoint(uri, &["check-room"]) else {
        return;
    };

    let result = Client::new()
        .post(resource.to_string())
        .json(&CheckRoomRequest::new(room))
        .send()
        .await;
    match result {
        Ok(response) => match response.json::<RoomStatus>().await {
            Ok(status) if status.exists => println!("room {room} exists"),
            Ok(_) => println!("room {room} not found"),
            Err(e) => println!("JSON decode error: {e}"),
        },
        Err(e) => println!("error: {e}"),
    }
}

/// Streams a cluster archive into a local file, `<cluster>.zip` by default.
pub async fn download_cluster(params: DownloadParams) {
    let segments = ["download", params.room.as_str(), params.cluster.as_str()];
    let Some(resource) = endpoint(&params.uri, &segments) else {
        return;
    };
    let output = match params.output {
        Some(output) => PathBuf::from(output),
        None => PathBuf::from(format!("{}.zip", params.cluster)),
    };

    let response = match Client::new().get(resource.to_string()).send().await {
        Ok(r) if r.status().is_success() => r,
        Ok(r) => {
            let status = r.status();
            let body = r.text().await.unwrap_or_default();
            println!("download failed. Status: {status} {body}");
            return;
        }
        Err(e) => {
            println!("error: {e}");
            return;
        }
    };

    match save_stream(response, &output).await {
        Ok(written) => println!("{} bytes written into {}", written, output.display()),
        Err(e) => {
            println!("download of {} interrupted: {e}", params.cluster);
            tokio::fs::remove_file(&output).await.unwrap_or_default();
        }
    }
}

fn endpoint(uri: &str, segments: &[&str]) -> Option<Resource> {
    let Some(mut resource) = Resource::new(uri) else {
        println!("invalid server URI: {uri}");
        return None;
    };
    for segment in segments {
        resource.append_segment(segment);
    }
    Some(resource)
}

async fn file_part(path: &str) -> std::io::Result<Part> {
    let file_name = Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("photo")
        .to_owned();
    let f = File::open(path).await?;
    let meta = f.metadata().await?;
    let stream = reqwest::Body::wrap_stream(ReaderStream::new(f));
    let part = Part::stream_with_length(stream, meta.len());
    Ok(part.file_name(file_name))
}

async fn print_reply(result: reqwest::Result<Response>, what: &str) {
    match result {
        Ok(x) => {
            println!("{what}. Status: {}", x.status());
            match x.text().await {
                Ok(body) => println!("{body}"),
                Err(e) => println!("cannot read response: {e}"),
            }
        }
        Err(e) => {
            println!("error: {e}");
        }
    }
}

async fn save_stream(response: Response, output: &Path) -> Result<u64, Box<dyn std::error::Error>> {
    let mut file = File::create(output).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}
