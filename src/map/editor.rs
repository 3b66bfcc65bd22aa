//! The per-shape editor popup, modelled as data.
//!
//! The rendering adapter shows [`EditableFields`] and feeds user input back through
//! [`Session::submit_name`] and [`Session::toggle_unit`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::geometry_collection::{Measurement, Shape};
use super::map_event::MapEvent;
use super::session::{OpenEditor, Session, ShapeId};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditError {
  #[error("name must not be empty")]
  EmptyName,
  #[error("no editor is open")]
  NotOpen,
  #[error("shape {0} does not exist")]
  UnknownShape(ShapeId),
}

/// Unit a measurement is displayed in. Stored values are always meters.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DisplayUnit {
  #[default]
  Meters,
  Kilometers,
}

impl DisplayUnit {
  #[must_use]
  pub fn toggled(self) -> Self {
    match self {
      DisplayUnit::Meters => DisplayUnit::Kilometers,
      DisplayUnit::Kilometers => DisplayUnit::Meters,
    }
  }

  /// Formats a measurement for display.
  #[must_use]
  pub fn format(self, measurement: Measurement) -> String {
    match (self, measurement) {
      (DisplayUnit::Meters, Measurement::Length(m)) => format!("{m:.2} м"),
      (DisplayUnit::Kilometers, Measurement::Length(m)) => format!("{:.2} км", m / 1_000.),
      (DisplayUnit::Meters, Measurement::Area(m2)) => format!("{m2:.2} м²"),
      (DisplayUnit::Kilometers, Measurement::Area(m2)) => format!("{:.2} км²", m2 / 1_000_000.),
    }
  }
}

/// What the editor shows for one shape.
#[derive(Debug, Clone, PartialEq)]
pub struct EditableFields {
  pub name: String,
  pub measurement: Option<Measurement>,
  pub unit: DisplayUnit,
}

impl EditableFields {
  #[must_use]
  pub fn measurement_text(&self) -> Option<String> {
    self.measurement.map(|m| self.unit.format(m))
  }
}

#[must_use]
pub fn editable_fields(shape: &Shape, unit: DisplayUnit) -> EditableFields {
  EditableFields {
    name: shape.name().to_owned(),
    measurement: shape.measurement(),
    unit,
  }
}

/// Writes the edited name back into the shape.
///
/// # Errors
/// Returns [`EditError::EmptyName`] for a blank name. The shape is left untouched.
pub fn apply_edit(shape: &mut Shape, fields: &EditableFields) -> Result<(), EditError> {
  if fields.name.trim().is_empty() {
    return Err(EditError::EmptyName);
  }
  fields.name.clone_into(&mut shape.properties_mut().name);
  Ok(())
}

impl Session {
  /// Opens the editor of `id` in meters, closing any other open editor.
  pub fn open_editor(&mut self, id: ShapeId) -> bool {
    if self.shape(id).is_none() {
      return false;
    }
    if let Some(open) = self.editor
      && open.id != id
    {
      self.emit(MapEvent::EditorClosed(open.id));
    }
    self.editor = Some(OpenEditor {
      id,
      unit: DisplayUnit::Meters,
    });
    self.emit(MapEvent::EditorOpened(id));
    true
  }

  /// The fields of the open editor.
  #[must_use]
  pub fn editor_fields(&self) -> Option<EditableFields> {
    let editor = self.editor?;
    self
      .shape(editor.id)
      .map(|shape| editable_fields(shape, editor.unit))
  }

  /// Switches the open editor between meters and kilometers. Stored values do not change.
  pub fn toggle_unit(&mut self) {
    if let Some(editor) = self.editor.as_mut() {
      editor.unit = editor.unit.toggled();
      let id = editor.id;
      self.emit(MapEvent::EditorChanged(id));
    }
  }

  /// Renames the shape of the open editor and closes it.
  ///
  /// # Errors
  /// A rejected name keeps the editor open.
  pub fn submit_name(&mut self, name: &str) -> Result<(), EditError> {
    let editor = self.editor.ok_or(EditError::NotOpen)?;
    let shape = self
      .shape_mut(editor.id)
      .ok_or(EditError::UnknownShape(editor.id))?;
    let mut fields = editable_fields(shape, editor.unit);
    name.clone_into(&mut fields.name);
    apply_edit(shape, &fields)?;

    log::debug!("Renamed shape {} to {name:?}", editor.id);
    self.emit(MapEvent::ShapeChanged(editor.id));
    self.close_editor();
    Ok(())
  }

  pub fn close_editor(&mut self) {
    if let Some(editor) = self.editor.take() {
      self.emit(MapEvent::EditorClosed(editor.id));
    }
  }
}
