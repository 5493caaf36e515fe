use std::io;

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};
use futures::Stream;
use utoipa::{
    openapi::{self, content, schema::Type, ObjectBuilder, RefOr, ResponseBuilder},
    ToResponse,
};

/// Zip archive of one cluster, streamed as the response body.
pub struct ZipReply<S> {
    cluster: String,
    stream: S,
}

impl<S> ZipReply<S> {
    #[must_use]
    pub fn new(cluster: &str, stream: S) -> Self {
        Self {
            cluster: cluster.to_owned(),
            stream,
        }
    }

    fn attachment_name(&self) -> String {
        let name: String = self
            .cluster
            .chars()
            .map(|c| if c == '"' || c.is_control() { '_' } else { c })
            .collect();
        format!("{name}.zip")
    }
}

impl<S> IntoResponse for ZipReply<S>
where
    S: Stream<Item = io::Result<Bytes>> + Send + 'static,
{
    fn into_response(self) -> Response {
        let attachment = format!(r#"attachment; filename="{}""#, self.attachment_name());
        let mut res = Body::from_stream(self.stream).into_response();
        res.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/zip"),
        );
        if let Ok(val) = HeaderValue::from_str(attachment.as_str()) {
            res.headers_mut().insert(header::CONTENT_DISPOSITION, val);
        }

        res
    }
}

/// Marker type describing the archive response in the API document.
pub struct ZipDoc;

impl ToResponse<'static> for ZipDoc {
    fn response() -> (&'static str, RefOr<openapi::Response>) {
        let object = ObjectBuilder::new()
            .schema_type(Type::String)
            .format(Some(openapi::SchemaFormat::KnownFormat(
                openapi::KnownFormat::Binary,
            )))
            .build();
        let content = content::Content::new(Some(object));
        (
            "ZipReply",
            ResponseBuilder::new()
                .description("Zip archive with every photo of the cluster")
                .content("application/zip", content)
                .build()
                .into(),
        )
    }
}
