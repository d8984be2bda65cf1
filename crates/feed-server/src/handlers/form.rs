//! Request body decoding for post create/update
//!
//! Posts arrive as `multipart/form-data` (fields `title`, `content`,
//! `image`). An `image` part with a filename is an upload; a plain text
//! `image` part names an already stored image. Updates may also be sent as
//! JSON `{title, content, image}`.

use axum::{
    extract::{
        multipart::Field,
        rejection::{JsonRejection, QueryRejection},
        FromRequest, Multipart, Query, Request,
    },
    http::header,
    Json,
};
use serde::Deserialize;

use crate::error::{Error, FieldError, Result};
use crate::images::ImageUpload;
use crate::models::PostInput;

pub struct PostForm {
    pub input: PostInput,
    pub upload: Option<ImageUpload>,
    pub image_ref: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JsonPostBody {
    title: String,
    content: String,
    image: Option<String>,
}

fn bad_body(detail: impl Into<String>) -> Error {
    Error::validation(vec![FieldError::new("body", detail)])
}

/// Unwrap a JSON extractor, turning rejections into the usual error body
pub fn json_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| bad_body(e.body_text()))
}

/// Unwrap the `?page=` query, reporting bad values on the `page` field
pub fn page_query<T>(query: std::result::Result<Query<T>, QueryRejection>) -> Result<T> {
    query
        .map(|Query(params)| params)
        .map_err(|e| Error::validation(vec![FieldError::new("page", e.body_text())]))
}

impl<S> FromRequest<S> for PostForm
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("multipart/form-data"));

        if is_multipart {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| bad_body(e.body_text()))?;
            return Self::from_multipart(multipart).await;
        }

        let body = json_body(Json::<JsonPostBody>::from_request(req, state).await)?;
        Ok(PostForm {
            input: PostInput::new(body.title, body.content),
            upload: None,
            image_ref: body.image,
        })
    }
}

impl PostForm {
    async fn from_multipart(mut multipart: Multipart) -> Result<Self> {
        let mut input = PostInput::default();
        let mut upload = None;
        let mut image_ref = None;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| bad_body(e.body_text()))?
        {
            let name = field.name().unwrap_or("").to_string();

            match name.as_str() {
                "title" => input.title = field_text(field).await?,
                "content" => input.content = field_text(field).await?,
                "image" => {
                    let file_name = field.file_name().map(str::to_string);
                    match file_name {
                        Some(file_name) => {
                            let content_type = field
                                .content_type()
                                .unwrap_or("application/octet-stream")
                                .to_string();
                            let data = field.bytes().await.map_err(|e| bad_body(e.body_text()))?;

                            // An untouched file input still sends an empty part
                            if !(file_name.is_empty() && data.is_empty()) {
                                upload = Some(ImageUpload::new(file_name, content_type, data));
                            }
                        }
                        None => image_ref = Some(field_text(field).await?),
                    }
                }
                _ => {}
            }
        }

        Ok(PostForm {
            input,
            upload,
            image_ref,
        })
    }
}

async fn field_text(field: Field<'_>) -> Result<String> {
    field.text().await.map_err(|e| bad_body(e.body_text()))
}
