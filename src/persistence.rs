//! Saving and loading sessions through a document store.

mod bridge;
mod envelope;
mod scheduler;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::Value;
use thiserror::Error;

pub use bridge::{FetchedDocument, PersistenceBridge, SaveOutcome};
pub use envelope::{ENVELOPE_KIND, ENVELOPE_VERSION, SaveEnvelope, SavedDocument};
pub use scheduler::SaveScheduler;

use crate::parser::CodecError;

/// Placeholder names older clients produced by accident. They are never accepted.
const DENYLISTED_FILE_NAMES: [&str; 5] = ["11", "123", "352345", "1233", "undefined"];

/// Errors reported by a [`FileApi`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FileApiError {
  #[error("document {0} not found")]
  NotFound(String),
  #[error("not authorized")]
  Unauthorized,
  #[error("access denied")]
  Forbidden,
  #[error("server responded {status}: {message}")]
  Status { status: u16, message: String },
  #[error("transport error: {0}")]
  Transport(String),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
  #[error("invalid file name {0:?}")]
  InvalidFileName(String),
  #[error(transparent)]
  Api(#[from] FileApiError),
  #[error("unrecognized document format")]
  UnrecognizedDocument,
  #[error(transparent)]
  Codec(#[from] CodecError),
  #[error("load of {file_name} was superseded by a newer load")]
  Superseded { file_name: String },
  #[error("no file name to autosave to")]
  NoCurrentFile,
}

/// The document store, usually reached over HTTP.
#[async_trait::async_trait]
pub trait FileApi: Send + Sync {
  async fn save_document(&self, file_name: &str, envelope: &SaveEnvelope)
  -> Result<(), FileApiError>;

  /// The stored document as it was saved, in any of the supported formats.
  async fn load_document(&self, file_name: &str) -> Result<Value, FileApiError>;

  async fn list_documents(&self) -> Result<Vec<String>, FileApiError>;

  async fn delete_document(&self, file_name: &str) -> Result<(), FileApiError>;
}

/// The question answers saved alongside the map.
pub trait QuestionAnswers {
  fn answers(&self) -> BTreeMap<String, String>;
  fn set_answers(&self, answers: BTreeMap<String, String>);
}

/// Keeps the answers in memory.
#[derive(Debug, Default)]
pub struct InMemoryAnswers {
  answers: RefCell<BTreeMap<String, String>>,
}

impl InMemoryAnswers {
  #[must_use]
  pub fn new(answers: BTreeMap<String, String>) -> Self {
    Self {
      answers: RefCell::new(answers),
    }
  }
}

impl QuestionAnswers for InMemoryAnswers {
  fn answers(&self) -> BTreeMap<String, String> {
    self.answers.borrow().clone()
  }

  fn set_answers(&self, answers: BTreeMap<String, String>) {
    *self.answers.borrow_mut() = answers;
  }
}

impl<T: QuestionAnswers + ?Sized> QuestionAnswers for Rc<T> {
  fn answers(&self) -> BTreeMap<String, String> {
    (**self).answers()
  }

  fn set_answers(&self, answers: BTreeMap<String, String>) {
    (**self).set_answers(answers);
  }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum NotificationLevel {
  Info,
  Success,
  Warning,
  Error,
}

/// Where outcomes are reported to the user.
pub trait Notifier {
  fn notify(&self, message: &str, level: NotificationLevel);

  /// Called when the store rejected the user. The default does nothing.
  fn on_unauthorized(&self) {}
}

/// Reports notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
  fn notify(&self, message: &str, level: NotificationLevel) {
    match level {
      NotificationLevel::Info | NotificationLevel::Success => log::info!("{message}"),
      NotificationLevel::Warning => log::warn!("{message}"),
      NotificationLevel::Error => log::error!("{message}"),
    }
  }

  fn on_unauthorized(&self) {
    log::warn!("Authentication required, please log in again");
  }
}

impl<T: Notifier + ?Sized> Notifier for Rc<T> {
  fn notify(&self, message: &str, level: NotificationLevel) {
    (**self).notify(message, level);
  }

  fn on_unauthorized(&self) {
    (**self).on_unauthorized();
  }
}

/// Rejects empty names and the known placeholder names.
///
/// # Errors
/// Returns [`PersistenceError::InvalidFileName`] for a rejected name.
pub fn validate_file_name(file_name: &str) -> Result<(), PersistenceError> {
  let trimmed = file_name.trim();
  if trimmed.is_empty()
    || DENYLISTED_FILE_NAMES.contains(&trimmed)
    || trimmed.starts_with("undefined_")
  {
    return Err(PersistenceError::InvalidFileName(file_name.to_owned()));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use rstest::rstest;

  #[rstest]
  #[case("")]
  #[case("   ")]
  #[case("11")]
  #[case("123")]
  #[case("352345")]
  #[case("1233")]
  #[case("undefined")]
  #[case("undefined_map")]
  fn rejected_file_names(#[case] name: &str) {
    assert!(matches!(
      validate_file_name(name),
      Err(PersistenceError::InvalidFileName(_))
    ));
  }

  #[rstest]
  #[case("river survey")]
  #[case("1234")]
  #[case("my_undefined")]
  fn accepted_file_names(#[case] name: &str) {
    assert!(validate_file_name(name).is_ok());
  }

  #[test]
  fn shared_answers_see_updates() {
    let answers = Rc::new(InMemoryAnswers::default());
    let shared: Box<dyn QuestionAnswers> = Box::new(Rc::clone(&answers));
    shared.set_answers(BTreeMap::from([("q1".to_owned(), "yes".to_owned())]));
    assert_eq!(answers.answers().get("q1").map(String::as_str), Some("yes"));
  }
}
