//! The two query endpoints.
//!
//! Both run the embedder on a blocking thread: an ONNX forward pass takes
//! tens of milliseconds and would stall the async executor if run inline.

use crate::error::{ServerError, ServerResult};
use crate::service::{RankedImage, SearchService};
use crate::state::ServerState;
use axum::extract::{Multipart, State};
use axum::response::IntoResponse;
use axum::{Form, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Form body for `POST /buscar_por_texto`.
#[derive(Debug, Deserialize)]
pub struct TextQuery {
    pub texto: String,
}

/// One entry in the `resultados` array.
#[derive(Debug, Serialize)]
pub struct ResultEntry {
    #[serde(rename = "imageName")]
    pub image_name: String,
    pub caption: String,
}

impl From<RankedImage> for ResultEntry {
    fn from(ranked: RankedImage) -> Self {
        Self {
            image_name: ranked.image_name,
            caption: ranked.caption,
        }
    }
}

/// Response for `POST /buscar_por_texto`.
#[derive(Debug, Serialize)]
pub struct TextSearchResponse {
    pub query: String,
    pub resultados: Vec<ResultEntry>,
}

/// Response for `POST /buscar_por_imagen`.
#[derive(Debug, Serialize)]
pub struct ImageSearchResponse {
    pub filename: String,
    pub resultados: Vec<ResultEntry>,
}

/// Search images by free-text query
///
/// `POST /buscar_por_texto` with a urlencoded form field `texto`.
pub async fn search_by_text(
    State(state): State<Arc<ServerState>>,
    Form(query): Form<TextQuery>,
) -> ServerResult<impl IntoResponse> {
    let service = state.service.clone();
    let text = query.texto.clone();

    let results = run_query(service, move |s| s.query_by_text(&text)).await?;

    tracing::debug!(query = %query.texto, results = results.len(), "text search done");
    Ok(Json(TextSearchResponse {
        query: query.texto,
        resultados: results.into_iter().map(ResultEntry::from).collect(),
    }))
}

/// Search images by example image
///
/// `POST /buscar_por_imagen` with a multipart body carrying one file part.
pub async fn search_by_image(
    State(state): State<Arc<ServerState>>,
    mut multipart: Multipart,
) -> ServerResult<impl IntoResponse> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ServerError::BadRequest(format!("invalid multipart body: {err}")))?
    {
        // First part with a filename (or named "file") is the upload.
        let is_file = field.file_name().is_some() || field.name() == Some("file");
        if !is_file {
            continue;
        }

        let filename = field
            .file_name()
            .unwrap_or("upload")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|err| ServerError::BadRequest(format!("failed to read upload: {err}")))?;
        upload = Some((filename, bytes.to_vec()));
        break;
    }

    let (filename, bytes) = upload
        .ok_or_else(|| ServerError::BadRequest("multipart body has no file part".to_string()))?;
    if bytes.is_empty() {
        return Err(ServerError::BadRequest("uploaded file is empty".to_string()));
    }

    let service = state.service.clone();
    let results = run_query(service, move |s| s.query_by_image(&bytes)).await?;

    tracing::debug!(%filename, results = results.len(), "image search done");
    Ok(Json(ImageSearchResponse {
        filename,
        resultados: results.into_iter().map(ResultEntry::from).collect(),
    }))
}

async fn run_query<F>(service: Arc<SearchService>, f: F) -> ServerResult<Vec<RankedImage>>
where
    F: FnOnce(&SearchService) -> ServerResult<Vec<RankedImage>> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&service))
        .await
        .map_err(|err| ServerError::Internal(format!("query task failed: {err}")))?
}
