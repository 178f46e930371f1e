use thiserror::Error;

use crate::model::User;

/// Outcome of the user form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormEvent {
    /// Submitted record; carries the id of the record being edited, if any
    Save(User),
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("{0} is required")]
    Required(&'static str),
}

/// Add/edit dialog with controlled name and phone fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserForm {
    editing: Option<User>,
    name: String,
    phone: String,
}

impl UserForm {
    /// Empty form for a new user.
    pub fn create() -> Self {
        Self {
            editing: None,
            name: String::new(),
            phone: String::new(),
        }
    }

    /// Form seeded from an existing user.
    pub fn edit(user: &User) -> Self {
        Self {
            editing: Some(user.clone()),
            name: user.name.clone(),
            phone: user.phone.clone(),
        }
    }

    pub fn is_editing(&self) -> bool {
        self.editing.is_some()
    }

    pub fn editing(&self) -> Option<&User> {
        self.editing.as_ref()
    }

    pub fn title(&self) -> &'static str {
        if self.is_editing() {
            "Edit user"
        } else {
            "Add user"
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phone(&self) -> &str {
        &self.phone
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_phone(&mut self, phone: impl Into<String>) {
        self.phone = phone.into();
    }

    /// Validate required fields and emit the record to save.
    pub fn submit(&self) -> Result<FormEvent, FormError> {
        if self.name.is_empty() {
            return Err(FormError::Required("name"));
        }
        if self.phone.is_empty() {
            return Err(FormError::Required("phone"));
        }
        Ok(FormEvent::Save(User {
            id: self.editing.as_ref().and_then(|u| u.id),
            name: self.name.clone(),
            phone: self.phone.clone(),
        }))
    }

    pub fn cancel(&self) -> FormEvent {
        FormEvent::Cancel
    }
}
