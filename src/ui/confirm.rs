use crate::model::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Confirm,
    Cancel,
}

/// Yes/no gate shown before a destructive action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfirmDialog {
    open: bool,
    title: Option<String>,
    message: String,
}

impl ConfirmDialog {
    pub fn closed() -> Self {
        Self::default()
    }

    pub fn open(title: Option<String>, message: impl Into<String>) -> Self {
        Self {
            open: true,
            title,
            message: message.into(),
        }
    }

    pub fn for_delete(user: &User) -> Self {
        Self::open(
            Some("Confirm user deletion".to_string()),
            format!("Are you sure you want to delete user \"{}\"?", user.name),
        )
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn confirm(&mut self) -> Choice {
        self.open = false;
        Choice::Confirm
    }

    pub fn cancel(&mut self) -> Choice {
        self.open = false;
        Choice::Cancel
    }
}
