//! HTML fragments returned by the form endpoints.

use std::fmt::Write;

use urlencoding::encode;

pub fn clustering_complete(room_id: &str, raw_output: &str) -> String {
    format!(
        "✅ Clustering complete!<br>\n\
         Room ID: <b>{}</b><br>\n\
         <pre>{}</pre>\n",
        escape(room_id),
        escape(raw_output)
    )
}

pub fn no_match() -> String {
    String::from("<p>❌ No images found in this cluster.</p>")
}

pub fn download_href(room_id: &str, cluster: &str) -> String {
    format!("/download/{}/{}", encode(room_id), encode(cluster))
}

pub fn image_src(room_id: &str, cluster: &str, image: &str) -> String {
    format!(
        "/clusters/{}/{}/{}",
        encode(room_id),
        encode(cluster),
        encode(image)
    )
}

pub fn search_results(room_id: &str, cluster: &str, images: &[String]) -> String {
    let mut tags = String::new();
    for image in images {
        let _ = writeln!(
            tags,
            r#"            <img src="{}" alt="{}" width="150" style="margin:5px">"#,
            escape(&image_src(room_id, cluster, image)),
            escape(image)
        );
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>ImageGenie - Search Results</title>
    <link rel="stylesheet" href="/style3.css">
</head>
<body>
    <div class="navbar">
        <div class="navbar-logo">ImageGenie</div>
    </div>

    <div class="container2" style="margin-top:30px;">
        <h1>Here are your Images</h1>
        <p>Cluster: <b>{cluster_text}</b></p>
        <a href="{download}" style="display:block; margin:20px 0;">⬇️ Download All</a>
        <div style="display:flex; flex-wrap:wrap;">
{tags}        </div>
    </div>

    <footer class="footer">
        <p>&copy; ImageGenie</p>
    </footer>
</body>
</html>
"#,
        cluster_text = escape(cluster),
        download = escape(&download_href(room_id, cluster)),
    )
}

/// Minimal HTML escaping for text and attribute values.
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
