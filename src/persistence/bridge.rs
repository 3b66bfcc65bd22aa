use std::cell::{Cell, RefCell};
use std::time::{Duration, Instant};

use serde_json::Value;

use super::{
  FileApi, FileApiError, NotificationLevel, Notifier, PersistenceError, QuestionAnswers,
  SaveEnvelope, SaveScheduler, SavedDocument, validate_file_name,
};
use crate::config::Config;
use crate::map::session::Session;
use crate::parser::{ImportReport, export_geojson, import_geojson};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
  Saved,
  /// Another save was in flight, the request was dropped.
  Busy,
}

/// A fetched document waiting to be applied to a session.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
  token: u64,
  file_name: String,
  document: Value,
}

impl FetchedDocument {
  #[must_use]
  pub fn file_name(&self) -> &str {
    &self.file_name
  }
}

/// Clears the busy flag when a save ends, also when its future is dropped.
struct SavingGuard<'a>(&'a Cell<bool>);

impl Drop for SavingGuard<'_> {
  fn drop(&mut self) {
    self.0.set(false);
  }
}

/// Connects a session to a document store.
///
/// All methods take `&self`, so a save that is in flight can be observed by a second save polled
/// concurrently on the same thread.
pub struct PersistenceBridge<A: FileApi> {
  api: A,
  answers: Box<dyn QuestionAnswers>,
  notifier: Box<dyn Notifier>,
  scheduler: RefCell<SaveScheduler>,
  saving: Cell<bool>,
  latest_load: Cell<u64>,
  current_file: RefCell<Option<String>>,
}

impl<A: FileApi> PersistenceBridge<A> {
  #[must_use]
  pub fn new(
    api: A,
    answers: Box<dyn QuestionAnswers>,
    notifier: Box<dyn Notifier>,
    autosave_interval: Duration,
  ) -> Self {
    Self {
      api,
      answers,
      notifier,
      scheduler: RefCell::new(SaveScheduler::new(autosave_interval)),
      saving: Cell::new(false),
      latest_load: Cell::new(0),
      current_file: RefCell::new(None),
    }
  }

  #[must_use]
  pub fn from_config(
    api: A,
    answers: Box<dyn QuestionAnswers>,
    notifier: Box<dyn Notifier>,
    config: &Config,
  ) -> Self {
    Self::new(api, answers, notifier, config.autosave_interval())
  }

  #[must_use]
  pub fn api(&self) -> &A {
    &self.api
  }

  #[must_use]
  pub fn is_saving(&self) -> bool {
    self.saving.get()
  }

  /// The file the session was last saved to or loaded from. Autosaves go there.
  #[must_use]
  pub fn current_file(&self) -> Option<String> {
    self.current_file.borrow().clone()
  }

  pub fn set_current_file(&self, file_name: impl Into<String>) {
    *self.current_file.borrow_mut() = Some(file_name.into());
  }

  #[must_use]
  pub fn autosave_deadline(&self) -> Option<Instant> {
    self.scheduler.borrow().deadline()
  }

  /// Snapshots the session and the question answers into a save envelope.
  #[must_use]
  pub fn prepare_save(&self, session: &Session) -> SaveEnvelope {
    log::debug!("Preparing save of {} shapes", session.shapes().len());
    SaveEnvelope::new(export_geojson(session), self.answers.answers())
  }

  /// Saves the session immediately, bypassing the debounce.
  ///
  /// The session is only read while the returned future is created, so it can be changed while
  /// the save is in flight.
  ///
  /// # Errors
  /// Fails for a rejected file name or when the store rejects the save.
  pub fn save_now<'a>(
    &'a self,
    session: &Session,
    file_name: &'a str,
  ) -> impl Future<Output = Result<SaveOutcome, PersistenceError>> + use<'a, A> {
    let envelope = self.prepare_save(session);
    self.submit(file_name, envelope)
  }

  /// Sends a prepared envelope to the store.
  ///
  /// # Errors
  /// Fails for a rejected file name or when the store rejects the save.
  pub async fn submit(
    &self,
    file_name: &str,
    envelope: SaveEnvelope,
  ) -> Result<SaveOutcome, PersistenceError> {
    validate_file_name(file_name).inspect_err(|e| self.notify_error(e))?;
    if self.saving.get() {
      self.notifier.notify(
        "A save is already in progress",
        NotificationLevel::Warning,
      );
      return Ok(SaveOutcome::Busy);
    }

    self.saving.set(true);
    let _guard = SavingGuard(&self.saving);
    self.scheduler.borrow_mut().cancel();

    log::debug!("Saving to {file_name}");
    self
      .api
      .save_document(file_name, &envelope)
      .await
      .map_err(PersistenceError::from)
      .inspect_err(|e| self.notify_error(e))?;

    self.set_current_file(file_name);
    self
      .notifier
      .notify(&format!("Saved {file_name}"), NotificationLevel::Success);
    Ok(SaveOutcome::Saved)
  }

  /// Schedules an automatic save, replacing a pending one.
  pub fn request_autosave(&self, now: Instant) {
    self.scheduler.borrow_mut().request(now);
  }

  /// Runs the pending automatic save if its deadline has passed.
  ///
  /// The future resolves to `None` if no save was due. Like [`PersistenceBridge::save_now`], it
  /// holds no borrow of the session.
  pub fn poll_autosave<'a>(
    &'a self,
    session: &Session,
    now: Instant,
  ) -> impl Future<Output = Option<Result<SaveOutcome, PersistenceError>>> + use<'a, A> {
    let envelope = self
      .scheduler
      .borrow_mut()
      .take_due(now)
      .then(|| self.prepare_save(session));
    async move {
      let envelope = envelope?;
      let Some(file_name) = self.current_file() else {
        log::warn!("Autosave skipped: no file name set");
        return Some(Err(PersistenceError::NoCurrentFile));
      };
      Some(self.submit(&file_name, envelope).await)
    }
  }

  /// Fetches a document. The result has to be passed to [`PersistenceBridge::apply`].
  ///
  /// # Errors
  /// Fails when the store cannot deliver the document.
  pub async fn fetch(&self, file_name: &str) -> Result<FetchedDocument, PersistenceError> {
    let token = self.latest_load.get() + 1;
    self.latest_load.set(token);

    let document = self
      .api
      .load_document(file_name)
      .await
      .map_err(PersistenceError::from)
      .inspect_err(|e| self.notify_error(e))?;
    Ok(FetchedDocument {
      token,
      file_name: file_name.to_owned(),
      document,
    })
  }

  /// Replaces the content of `session` with a fetched document.
  ///
  /// # Errors
  /// Fails if a newer load was started after this one, or if the document has no recognizable
  /// format. The session is unchanged in both cases.
  pub fn apply(
    &self,
    session: &mut Session,
    fetched: FetchedDocument,
  ) -> Result<ImportReport, PersistenceError> {
    if fetched.token != self.latest_load.get() {
      log::debug!("Discarding stale load of {}", fetched.file_name);
      return Err(PersistenceError::Superseded {
        file_name: fetched.file_name,
      });
    }

    let (collection, answers) = SavedDocument::classify(fetched.document)
      .inspect_err(|e| self.notify_error(e))?
      .into_parts();
    let report = import_geojson(session, &collection)
      .map_err(PersistenceError::from)
      .inspect_err(|e| self.notify_error(e))?;
    if let Some(answers) = answers {
      self.answers.set_answers(answers);
    }

    self.set_current_file(fetched.file_name.clone());
    self.notifier.notify(
      &format!("Loaded {} ({} shapes)", fetched.file_name, report.imported),
      NotificationLevel::Success,
    );
    if report.skipped > 0 {
      self.notifier.notify(
        &format!("{} features could not be read", report.skipped),
        NotificationLevel::Warning,
      );
    }
    Ok(report)
  }

  /// Fetches and applies a document.
  ///
  /// # Errors
  /// See [`PersistenceBridge::fetch`] and [`PersistenceBridge::apply`].
  pub async fn load(
    &self,
    session: &mut Session,
    file_name: &str,
  ) -> Result<ImportReport, PersistenceError> {
    let fetched = self.fetch(file_name).await?;
    self.apply(session, fetched)
  }

  /// # Errors
  /// Fails when the store cannot list the documents.
  pub async fn list(&self) -> Result<Vec<String>, PersistenceError> {
    self
      .api
      .list_documents()
      .await
      .map_err(PersistenceError::from)
      .inspect_err(|e| self.notify_error(e))
  }

  /// # Errors
  /// Fails when the store cannot delete the document.
  pub async fn delete(&self, file_name: &str) -> Result<(), PersistenceError> {
    self
      .api
      .delete_document(file_name)
      .await
      .map_err(PersistenceError::from)
      .inspect_err(|e| self.notify_error(e))?;

    let mut current = self.current_file.borrow_mut();
    if current.as_deref() == Some(file_name) {
      *current = None;
    }
    drop(current);
    self
      .notifier
      .notify(&format!("Deleted {file_name}"), NotificationLevel::Success);
    Ok(())
  }

  fn notify_error(&self, error: &PersistenceError) {
    log::error!("{error}");
    self.notifier.notify(&error.to_string(), NotificationLevel::Error);
    if matches!(error, PersistenceError::Api(FileApiError::Unauthorized)) {
      self.notifier.on_unauthorized();
    }
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;
  use std::rc::Rc;
  use std::sync::Mutex;

  use futures::channel::oneshot;
  use futures::executor::block_on;
  use serde_json::json;

  use super::*;
  use crate::map::coordinates::WGS84Coordinate;
  use crate::map::geometry_collection::Shape;
  use crate::persistence::InMemoryAnswers;

  #[derive(Default)]
  struct MockApi {
    saved: Mutex<Vec<(String, SaveEnvelope)>>,
    documents: Mutex<BTreeMap<String, Value>>,
    save_gate: Mutex<Option<oneshot::Receiver<()>>>,
    unauthorized: bool,
  }

  impl MockApi {
    fn with_document(name: &str, document: Value) -> Self {
      let api = Self::default();
      api
        .documents
        .lock()
        .unwrap()
        .insert(name.to_owned(), document);
      api
    }

    fn save_count(&self) -> usize {
      self.saved.lock().unwrap().len()
    }
  }

  #[async_trait::async_trait]
  impl FileApi for MockApi {
    async fn save_document(
      &self,
      file_name: &str,
      envelope: &SaveEnvelope,
    ) -> Result<(), FileApiError> {
      if self.unauthorized {
        return Err(FileApiError::Unauthorized);
      }
      let gate = self.save_gate.lock().unwrap().take();
      if let Some(gate) = gate {
        let _ = gate.await;
      }
      self
        .saved
        .lock()
        .unwrap()
        .push((file_name.to_owned(), envelope.clone()));
      Ok(())
    }

    async fn load_document(&self, file_name: &str) -> Result<Value, FileApiError> {
      self
        .documents
        .lock()
        .unwrap()
        .get(file_name)
        .cloned()
        .ok_or_else(|| FileApiError::NotFound(file_name.to_owned()))
    }

    async fn list_documents(&self) -> Result<Vec<String>, FileApiError> {
      Ok(self.documents.lock().unwrap().keys().cloned().collect())
    }

    async fn delete_document(&self, file_name: &str) -> Result<(), FileApiError> {
      self
        .documents
        .lock()
        .unwrap()
        .remove(file_name)
        .map(|_| ())
        .ok_or_else(|| FileApiError::NotFound(file_name.to_owned()))
    }
  }

  #[derive(Default)]
  struct RecordingNotifier {
    messages: RefCell<Vec<(String, NotificationLevel)>>,
    unauthorized: Cell<usize>,
  }

  impl RecordingNotifier {
    fn levels(&self) -> Vec<NotificationLevel> {
      self.messages.borrow().iter().map(|(_, l)| *l).collect()
    }
  }

  impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str, level: NotificationLevel) {
      self.messages.borrow_mut().push((message.to_owned(), level));
    }

    fn on_unauthorized(&self) {
      self.unauthorized.set(self.unauthorized.get() + 1);
    }
  }

  struct Fixture {
    bridge: PersistenceBridge<MockApi>,
    answers: Rc<InMemoryAnswers>,
    notifier: Rc<RecordingNotifier>,
  }

  fn fixture(api: MockApi) -> Fixture {
    let answers = Rc::new(InMemoryAnswers::default());
    let notifier = Rc::new(RecordingNotifier::default());
    let bridge = PersistenceBridge::new(
      api,
      Box::new(Rc::clone(&answers)),
      Box::new(Rc::clone(&notifier)),
      Duration::from_millis(2000),
    );
    Fixture {
      bridge,
      answers,
      notifier,
    }
  }

  fn session_with_marker() -> Session {
    let mut session = Session::new();
    session.add_shape(Shape::marker(WGS84Coordinate::new(53.7, 87.1)), false);
    session
  }

  fn point_collection(name: &str) -> Value {
    json!({
      "type": "FeatureCollection",
      "features": [{
        "type": "Feature",
        "geometry": {"type": "Point", "coordinates": [87.1, 53.7]},
        "properties": {"name": name}
      }]
    })
  }

  #[test]
  fn save_builds_envelope_with_answers() {
    let f = fixture(MockApi::default());
    f.answers
      .set_answers(BTreeMap::from([("q1".to_owned(), "42".to_owned())]));
    let session = session_with_marker();

    let outcome = block_on(f.bridge.save_now(&session, "survey")).unwrap();

    assert_eq!(outcome, SaveOutcome::Saved);
    let saved = f.bridge.api().saved.lock().unwrap();
    let (name, envelope) = &saved[0];
    assert_eq!(name, "survey");
    assert_eq!(envelope.kind, "MapWithQuestions");
    assert_eq!(envelope.geojson["features"].as_array().map(Vec::len), Some(1));
    assert_eq!(envelope.answers.get("q1").map(String::as_str), Some("42"));
    assert_eq!(f.bridge.current_file().as_deref(), Some("survey"));
    assert_eq!(f.notifier.levels(), vec![NotificationLevel::Success]);
  }

  #[test]
  fn invalid_name_is_rejected_locally() {
    let f = fixture(MockApi::default());
    let result = block_on(f.bridge.save_now(&Session::new(), "undefined_1"));
    assert!(matches!(result, Err(PersistenceError::InvalidFileName(_))));
    assert_eq!(f.bridge.api().save_count(), 0);
    assert_eq!(f.notifier.levels(), vec![NotificationLevel::Error]);
  }

  #[test]
  fn concurrent_save_is_dropped() {
    let (release, gate) = oneshot::channel();
    let api = MockApi::default();
    *api.save_gate.lock().unwrap() = Some(gate);
    let f = fixture(api);
    let session = session_with_marker();

    let (first, second) = block_on(async {
      futures::join!(f.bridge.save_now(&session, "a"), async {
        let outcome = f.bridge.save_now(&session, "a").await;
        let _ = release.send(());
        outcome
      })
    });

    assert_eq!(first.unwrap(), SaveOutcome::Saved);
    assert_eq!(second.unwrap(), SaveOutcome::Busy);
    assert_eq!(f.bridge.api().save_count(), 1);
    assert!(!f.bridge.is_saving());
  }

  #[test]
  fn session_stays_editable_while_saving() {
    let (release, gate) = oneshot::channel();
    let api = MockApi::default();
    *api.save_gate.lock().unwrap() = Some(gate);
    let f = fixture(api);
    let mut session = session_with_marker();
    session.attach_map(crate::map::session::MapView::default());
    session.on_tool_selected(crate::map::drawing::Tool::Marker);

    let (outcome, ()) = block_on(async {
      futures::join!(f.bridge.save_now(&session, "live"), async {
        session.on_map_click(WGS84Coordinate::new(1., 1.));
        let _ = release.send(());
      })
    });

    assert_eq!(outcome.unwrap(), SaveOutcome::Saved);
    assert_eq!(session.shapes().len(), 2);
    let saved = f.bridge.api().saved.lock().unwrap();
    assert_eq!(saved[0].1.geojson["features"].as_array().map(Vec::len), Some(1));
  }

  #[test]
  fn autosave_burst_saves_once() {
    let f = fixture(MockApi::default());
    let session = session_with_marker();
    f.bridge.set_current_file("draft");
    let start = Instant::now();

    for offset in [0, 200, 450] {
      f.bridge.request_autosave(start + Duration::from_millis(offset));
    }
    for tick in (0..=5000).step_by(50) {
      let now = start + Duration::from_millis(tick);
      if let Some(result) = block_on(f.bridge.poll_autosave(&session, now)) {
        assert!(tick >= 2000);
        assert_eq!(result.unwrap(), SaveOutcome::Saved);
      }
    }
    assert_eq!(f.bridge.api().save_count(), 1);
  }

  #[test]
  fn explicit_save_cancels_pending_autosave() {
    let f = fixture(MockApi::default());
    let session = Session::new();
    let start = Instant::now();
    f.bridge.request_autosave(start);
    block_on(f.bridge.save_now(&session, "map")).unwrap();
    assert_eq!(f.bridge.autosave_deadline(), None);
    assert!(block_on(f.bridge.poll_autosave(&session, start + Duration::from_secs(5))).is_none());
  }

  #[test]
  fn autosave_without_file_fails() {
    let f = fixture(MockApi::default());
    let start = Instant::now();
    f.bridge.request_autosave(start);
    let result = block_on(f.bridge.poll_autosave(&Session::new(), start + Duration::from_secs(3)));
    assert!(matches!(result, Some(Err(PersistenceError::NoCurrentFile))));
  }

  #[test]
  fn unauthorized_triggers_login() {
    let f = fixture(MockApi {
      unauthorized: true,
      ..MockApi::default()
    });
    let result = block_on(f.bridge.save_now(&Session::new(), "map"));
    assert!(matches!(
      result,
      Err(PersistenceError::Api(FileApiError::Unauthorized))
    ));
    assert_eq!(f.notifier.unauthorized.get(), 1);
    assert!(!f.bridge.is_saving());
  }

  #[test]
  fn load_envelope_routes_answers() {
    let envelope = json!({
      "kind": "MapWithQuestions",
      "version": "1.0",
      "geojson": point_collection("X"),
      "answers": {"q1": "yes"},
      "savedAt": "2024-03-01T10:00:00Z"
    });
    let f = fixture(MockApi::with_document("doc", envelope));
    let mut session = session_with_marker();
    session.add_shape(Shape::marker(WGS84Coordinate::new(0., 0.)), false);

    let report = block_on(f.bridge.load(&mut session, "doc")).unwrap();

    assert_eq!(report.imported, 1);
    assert_eq!(session.shapes().len(), 1);
    assert_eq!(session.shapes().shapes().next().map(Shape::name), Some("X"));
    assert_eq!(f.answers.answers().get("q1").map(String::as_str), Some("yes"));
    assert_eq!(f.bridge.current_file().as_deref(), Some("doc"));
  }

  #[test]
  fn legacy_load_keeps_answers() {
    let f = fixture(MockApi::with_document("old", point_collection("X")));
    f.answers
      .set_answers(BTreeMap::from([("q1".to_owned(), "kept".to_owned())]));
    let mut session = Session::new();
    block_on(f.bridge.load(&mut session, "old")).unwrap();
    assert_eq!(f.answers.answers().get("q1").map(String::as_str), Some("kept"));
  }

  #[test]
  fn stale_load_is_discarded() {
    let api = MockApi::with_document("first", point_collection("first"));
    api
      .documents
      .lock()
      .unwrap()
      .insert("second".to_owned(), point_collection("second"));
    let f = fixture(api);
    let mut session = Session::new();

    let first = block_on(f.bridge.fetch("first")).unwrap();
    let second = block_on(f.bridge.fetch("second")).unwrap();
    f.bridge.apply(&mut session, second).unwrap();
    let stale = f.bridge.apply(&mut session, first);

    assert!(matches!(stale, Err(PersistenceError::Superseded { .. })));
    assert_eq!(session.shapes().shapes().next().map(Shape::name), Some("second"));
  }

  #[test]
  fn unrecognized_document_keeps_session() {
    let f = fixture(MockApi::with_document("bad", json!({"map": []})));
    let mut session = session_with_marker();
    let result = block_on(f.bridge.load(&mut session, "bad"));
    assert!(matches!(result, Err(PersistenceError::UnrecognizedDocument)));
    assert_eq!(session.shapes().len(), 1);
    assert_eq!(f.notifier.levels(), vec![NotificationLevel::Error]);
  }

  #[test]
  fn missing_document_reports_not_found() {
    let f = fixture(MockApi::default());
    let result = block_on(f.bridge.load(&mut Session::new(), "nope"));
    assert!(matches!(
      result,
      Err(PersistenceError::Api(FileApiError::NotFound(_)))
    ));
  }

  #[test]
  fn delete_forgets_current_file() {
    let f = fixture(MockApi::with_document("doc", point_collection("X")));
    f.bridge.set_current_file("doc");
    block_on(f.bridge.delete("doc")).unwrap();
    assert_eq!(f.bridge.current_file(), None);
    assert!(block_on(f.bridge.list()).unwrap().is_empty());
  }
}
