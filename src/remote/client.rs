use serde_json::{Value, json};
use surf::StatusCode;

use super::{ROLE_HEADER, USER_HEADER};
use crate::config::Config;
use crate::persistence::{FileApi, FileApiError, SaveEnvelope};

/// Talks to the document server over HTTP.
#[derive(Clone)]
pub struct HttpFileApi {
  base_url: String,
  user: Option<String>,
  role: Option<String>,
  client: surf::Client,
}

impl HttpFileApi {
  #[must_use]
  pub fn new(base_url: impl Into<String>) -> Self {
    Self {
      base_url: base_url.into().trim_end_matches('/').to_owned(),
      user: None,
      role: None,
      client: surf::Client::new(),
    }
  }

  #[must_use]
  pub fn from_config(config: &Config) -> Self {
    let mut api = Self::new(config.server_url());
    api.user.clone_from(&config.user);
    api.role.clone_from(&config.role);
    api
  }

  #[must_use]
  pub fn with_user(mut self, user: impl Into<String>) -> Self {
    self.user = Some(user.into());
    self
  }

  #[must_use]
  pub fn with_role(mut self, role: impl Into<String>) -> Self {
    self.role = Some(role.into());
    self
  }

  fn url(&self, path: &str) -> String {
    format!("{}{path}", self.base_url)
  }

  fn with_identity(&self, mut request: surf::RequestBuilder) -> surf::RequestBuilder {
    if let Some(user) = &self.user {
      request = request.header(USER_HEADER, user.as_str());
    }
    if let Some(role) = &self.role {
      request = request.header(ROLE_HEADER, role.as_str());
    }
    request
  }

  /// Sends a request and turns non-success responses into errors.
  async fn send(
    &self,
    request: surf::RequestBuilder,
    file_name: Option<&str>,
  ) -> Result<surf::Response, FileApiError> {
    let mut response = self
      .with_identity(request)
      .await
      .map_err(|e| FileApiError::Transport(e.to_string()))?;
    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }

    let body = response.body_string().await.unwrap_or_default();
    log::debug!("Request failed with {status}: {body}");
    Err(match status {
      StatusCode::NotFound => FileApiError::NotFound(file_name.unwrap_or_default().to_owned()),
      StatusCode::Unauthorized => FileApiError::Unauthorized,
      StatusCode::Forbidden => FileApiError::Forbidden,
      _ => FileApiError::Status {
        status: status.into(),
        message: error_message(&body),
      },
    })
  }

  /// Every stored document with its owner. Only available to the admin roles.
  ///
  /// # Errors
  /// Fails with [`FileApiError::Forbidden`] for other roles.
  pub async fn list_all_documents(&self) -> Result<Vec<(String, String)>, FileApiError> {
    let request = self.client.get(self.url("/admin/files"));
    let mut response = self.send(request, None).await?;
    let entries: Value = response
      .body_json()
      .await
      .map_err(|e| FileApiError::Transport(e.to_string()))?;
    Ok(
      entries
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|entry| {
          let user = entry.get("user")?.as_str()?;
          let file_name = entry.get("fileName")?.as_str()?;
          Some((user.to_owned(), file_name.to_owned()))
        })
        .collect(),
    )
  }

  /// A document of another user. Only available to the admin roles.
  ///
  /// # Errors
  /// Fails with [`FileApiError::Forbidden`] for other roles.
  pub async fn load_user_document(
    &self,
    user: &str,
    file_name: &str,
  ) -> Result<Value, FileApiError> {
    let url = self.url(&format!(
      "/admin/load/{}/{}",
      urlencoding::encode(user),
      urlencoding::encode(file_name)
    ));
    let request = self.client.get(url);
    let mut response = self.send(request, Some(file_name)).await?;
    response
      .body_json::<Value>()
      .await
      .map(unwrap_file_content)
      .map_err(|e| FileApiError::Transport(e.to_string()))
  }
}

#[async_trait::async_trait]
impl FileApi for HttpFileApi {
  async fn save_document(
    &self,
    file_name: &str,
    envelope: &SaveEnvelope,
  ) -> Result<(), FileApiError> {
    let body = json!({
      "fileName": file_name,
      "geojsonData": envelope,
    });
    let request = self
      .client
      .post(self.url("/save"))
      .body_json(&body)
      .map_err(|e| FileApiError::Transport(e.to_string()))?;
    self.send(request, Some(file_name)).await?;
    Ok(())
  }

  async fn load_document(&self, file_name: &str) -> Result<Value, FileApiError> {
    let url = self.url(&format!("/load/{}", urlencoding::encode(file_name)));
    let request = self.client.get(url);
    let mut response = self.send(request, Some(file_name)).await?;
    response
      .body_json::<Value>()
      .await
      .map(unwrap_file_content)
      .map_err(|e| FileApiError::Transport(e.to_string()))
  }

  async fn list_documents(&self) -> Result<Vec<String>, FileApiError> {
    let request = self.client.get(self.url("/files"));
    let mut response = self.send(request, None).await?;
    let files: Value = response
      .body_json()
      .await
      .map_err(|e| FileApiError::Transport(e.to_string()))?;
    Ok(file_names(&files))
  }

  async fn delete_document(&self, file_name: &str) -> Result<(), FileApiError> {
    let url = self.url(&format!("/delete/{}", urlencoding::encode(file_name)));
    let request = self.client.delete(url);
    self.send(request, Some(file_name)).await?;
    Ok(())
  }
}

/// Some servers wrap the document as `{"file_content": ...}`.
fn unwrap_file_content(value: Value) -> Value {
  match value {
    Value::Object(mut obj) if obj.len() == 1 && obj.contains_key("file_content") => {
      obj.remove("file_content").unwrap_or(Value::Null)
    }
    other => other,
  }
}

/// File names from either a list of names or a list of `{fileName}` objects.
fn file_names(files: &Value) -> Vec<String> {
  files
    .as_array()
    .into_iter()
    .flatten()
    .filter_map(|entry| match entry {
      Value::String(name) => Some(name.clone()),
      Value::Object(obj) => obj
        .get("fileName")
        .or_else(|| obj.get("name"))
        .and_then(Value::as_str)
        .map(str::to_owned),
      _ => None,
    })
    .collect()
}

/// The `error` field of a JSON error body, or the body itself.
fn error_message(body: &str) -> String {
  serde_json::from_str::<Value>(body)
    .ok()
    .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_owned))
    .unwrap_or_else(|| body.to_owned())
}
