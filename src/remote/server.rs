use std::future::Future;
use std::path::{Path, PathBuf};

use axum::{
  Json, Router,
  extract::{DefaultBodyLimit, FromRequestParts, Path as UrlPath, State},
  http::{StatusCode, request::Parts},
  response::{IntoResponse, Response},
  routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::{self, TraceLayer};
use tracing::{info, warn};

use super::{ADMIN_ROLES, ROLE_HEADER, USER_HEADER};
use crate::persistence::validate_file_name;

const DOCUMENT_EXTENSION: &str = "json";
const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ServerError {
  #[error("invalid file name {0:?}")]
  InvalidName(String),
  #[error("file {0} not found")]
  NotFound(String),
  #[error("missing x-mapnote-user header")]
  Unauthenticated,
  #[error("access denied")]
  Forbidden,
  #[error("storage error: {0}")]
  Io(#[from] std::io::Error),
  #[error("stored document is not valid JSON: {0}")]
  Json(#[from] serde_json::Error),
}

impl IntoResponse for ServerError {
  fn into_response(self) -> Response {
    let status = match &self {
      ServerError::InvalidName(_) => StatusCode::BAD_REQUEST,
      ServerError::NotFound(_) => StatusCode::NOT_FOUND,
      ServerError::Unauthenticated => StatusCode::UNAUTHORIZED,
      ServerError::Forbidden => StatusCode::FORBIDDEN,
      ServerError::Io(_) | ServerError::Json(_) => {
        warn!("{self}");
        StatusCode::INTERNAL_SERVER_ERROR
      }
    };
    (status, Json(json!({ "error": self.to_string() }))).into_response()
  }
}

/// One document in the admin listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminEntry {
  pub user: String,
  pub file_name: String,
}

/// Stores documents as `<root>/<user>/<file name>.json`.
#[derive(Debug, Clone)]
pub struct DocumentStore {
  root: PathBuf,
}

impl DocumentStore {
  #[must_use]
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  #[must_use]
  pub fn root(&self) -> &Path {
    &self.root
  }

  fn document_path(&self, user: &str, file_name: &str) -> Result<PathBuf, ServerError> {
    check_path_segment(user)?;
    check_path_segment(file_name)?;
    validate_file_name(file_name).map_err(|_| ServerError::InvalidName(file_name.to_owned()))?;
    Ok(
      self
        .root
        .join(user)
        .join(format!("{file_name}.{DOCUMENT_EXTENSION}")),
    )
  }

  /// # Errors
  /// Fails for a rejected name or when the file cannot be written.
  pub async fn save(
    &self,
    user: &str,
    file_name: &str,
    document: &Value,
  ) -> Result<(), ServerError> {
    let path = self.document_path(user, file_name)?;
    if let Some(dir) = path.parent() {
      tokio::fs::create_dir_all(dir).await?;
    }
    tokio::fs::write(&path, serde_json::to_vec(document)?).await?;
    info!("Saved {}", path.display());
    Ok(())
  }

  /// # Errors
  /// Fails with [`ServerError::NotFound`] if the document does not exist.
  pub async fn load(&self, user: &str, file_name: &str) -> Result<Value, ServerError> {
    let path = self.document_path(user, file_name)?;
    let content = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
      std::io::ErrorKind::NotFound => ServerError::NotFound(file_name.to_owned()),
      _ => ServerError::Io(e),
    })?;
    Ok(serde_json::from_slice(&content)?)
  }

  /// # Errors
  /// Fails with [`ServerError::NotFound`] if the document does not exist.
  pub async fn delete(&self, user: &str, file_name: &str) -> Result<(), ServerError> {
    let path = self.document_path(user, file_name)?;
    tokio::fs::remove_file(&path).await.map_err(|e| match e.kind() {
      std::io::ErrorKind::NotFound => ServerError::NotFound(file_name.to_owned()),
      _ => ServerError::Io(e),
    })?;
    info!("Deleted {}", path.display());
    Ok(())
  }

  /// The names of the documents of `user`, sorted.
  ///
  /// # Errors
  /// Fails when the directory cannot be read.
  pub async fn list(&self, user: &str) -> Result<Vec<String>, ServerError> {
    check_path_segment(user)?;
    Self::document_names(&self.root.join(user)).await
  }

  /// Every document of every user.
  ///
  /// # Errors
  /// Fails when the storage root cannot be read.
  pub async fn list_all(&self) -> Result<Vec<AdminEntry>, ServerError> {
    let mut users = Vec::new();
    match tokio::fs::read_dir(&self.root).await {
      Ok(mut dir) => {
        while let Some(entry) = dir.next_entry().await? {
          if entry.file_type().await?.is_dir() {
            users.push(entry.file_name().to_string_lossy().into_owned());
          }
        }
      }
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
      Err(e) => return Err(e.into()),
    }
    users.sort();

    let mut entries = Vec::new();
    for user in users {
      for file_name in Self::document_names(&self.root.join(&user)).await? {
        entries.push(AdminEntry {
          user: user.clone(),
          file_name,
        });
      }
    }
    Ok(entries)
  }

  async fn document_names(dir: &Path) -> Result<Vec<String>, ServerError> {
    let mut names = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
      Ok(entries) => entries,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
      Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
      let path = entry.path();
      if path.extension().is_some_and(|ext| ext == DOCUMENT_EXTENSION)
        && let Some(stem) = path.file_stem()
      {
        names.push(stem.to_string_lossy().into_owned());
      }
    }
    names.sort();
    Ok(names)
  }
}

/// Rejects names that would escape their directory.
fn check_path_segment(segment: &str) -> Result<(), ServerError> {
  let invalid = segment.trim().is_empty()
    || segment.starts_with('.')
    || segment.contains(['/', '\\'])
    || segment.chars().any(char::is_control);
  if invalid {
    return Err(ServerError::InvalidName(segment.to_owned()));
  }
  Ok(())
}

/// The user a request is made for, taken from the identity headers.
#[derive(Debug, Clone)]
pub struct Identity {
  pub user: String,
  pub role: Option<String>,
}

impl Identity {
  fn require_admin(&self) -> Result<(), ServerError> {
    match self.role.as_deref() {
      Some(role) if ADMIN_ROLES.contains(&role) => Ok(()),
      _ => Err(ServerError::Forbidden),
    }
  }
}

impl<S: Send + Sync> FromRequestParts<S> for Identity {
  type Rejection = ServerError;

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    let header = |name: &str| {
      parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
    };
    let user = header(USER_HEADER).ok_or(ServerError::Unauthenticated)?;
    Ok(Self {
      user,
      role: header(ROLE_HEADER),
    })
  }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveRequest {
  file_name: String,
  geojson_data: Value,
}

async fn save(
  State(store): State<DocumentStore>,
  identity: Identity,
  Json(request): Json<SaveRequest>,
) -> Result<Json<Value>, ServerError> {
  store
    .save(&identity.user, &request.file_name, &request.geojson_data)
    .await?;
  Ok(Json(json!({
    "message": format!("Saved {}", request.file_name),
  })))
}

async fn load(
  State(store): State<DocumentStore>,
  identity: Identity,
  UrlPath(file_name): UrlPath<String>,
) -> Result<Json<Value>, ServerError> {
  store.load(&identity.user, &file_name).await.map(Json)
}

async fn files(
  State(store): State<DocumentStore>,
  identity: Identity,
) -> Result<Json<Vec<String>>, ServerError> {
  store.list(&identity.user).await.map(Json)
}

async fn remove(
  State(store): State<DocumentStore>,
  identity: Identity,
  UrlPath(file_name): UrlPath<String>,
) -> Result<Json<Value>, ServerError> {
  store.delete(&identity.user, &file_name).await?;
  Ok(Json(json!({ "message": format!("Deleted {file_name}") })))
}

async fn admin_files(
  State(store): State<DocumentStore>,
  identity: Identity,
) -> Result<Json<Vec<AdminEntry>>, ServerError> {
  identity.require_admin()?;
  store.list_all().await.map(Json)
}

async fn admin_load(
  State(store): State<DocumentStore>,
  identity: Identity,
  UrlPath((user, file_name)): UrlPath<(String, String)>,
) -> Result<Json<Value>, ServerError> {
  identity.require_admin()?;
  store.load(&user, &file_name).await.map(Json)
}

async fn healthcheck() {}

/// The routes of the document server.
pub fn router(store: DocumentStore) -> Router {
  Router::new()
    .route("/save", post(save))
    .route("/load/{file_name}", get(load))
    .route("/files", get(files))
    .route("/delete/{file_name}", delete(remove))
    .route("/admin/files", get(admin_files))
    .route("/admin/load/{user}/{file_name}", get(admin_load))
    .route("/healthcheck", get(healthcheck))
    .with_state(store)
    .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
    .layer(
      TraceLayer::new_for_http()
        .make_span_with(trace::DefaultMakeSpan::new().level(tracing::Level::INFO))
        .on_response(trace::DefaultOnResponse::new().level(tracing::Level::INFO)),
    )
}

/// Serves `store` on `listener` until `shutdown` resolves.
///
/// # Errors
/// Fails if the server cannot accept connections.
pub async fn serve(
  listener: TcpListener,
  store: DocumentStore,
  shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
  info!(
    "Serving documents from {} on {}",
    store.root().display(),
    listener.local_addr()?
  );
  axum::serve(listener, router(store))
    .with_graceful_shutdown(shutdown)
    .await
}
