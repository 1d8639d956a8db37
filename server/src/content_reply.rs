use axum::{
    body::Body,
    http::HeaderValue,
    response::{IntoResponse, Response},
};

/// Payload served by the gateway, named after its content identifier.
pub struct ContentReply {
    data: Vec<u8>,
    cid: String,
}

impl ContentReply {
    #[must_use]
    pub fn new(data: Vec<u8>, cid: String) -> Self {
        Self { data, cid }
    }
}

impl IntoResponse for ContentReply {
    fn into_response(self) -> Response {
        let len = self.data.len().to_string();
        let mut res = Body::from(self.data).into_response();
        res.headers_mut().insert(
            "content-type",
            HeaderValue::from_static("application/octet-stream"),
        );
        let attachment = format!(r#"attachment; filename="{}""#, self.cid);
        if let Ok(val) = HeaderValue::from_str(attachment.as_str()) {
            res.headers_mut().insert("content-disposition", val);
        }
        // content identifiers never change their bytes
        if let Ok(val) = HeaderValue::from_str(&format!(r#""{}""#, self.cid)) {
            res.headers_mut().insert("etag", val);
        }
        if let Ok(val) = HeaderValue::from_str(len.as_str()) {
            res.headers_mut().insert("content-length", val);
        }

        res
    }
}
