use tokio::task::JoinHandle;

use super::confirm::ConfirmDialog;
use super::form::{FormError, FormEvent, UserForm};
use crate::model::User;
use crate::push::{PushChannel, PushError, Subscription};
use crate::reconciler::Reconciler;

/// Controller of the user management page.
///
/// Holds dialog state only. User intents become reconciler commands, and the
/// dialogs close as soon as the command is dispatched, whatever the backend
/// later answers.
pub struct ManagementPage {
    reconciler: Reconciler,
    form: Option<UserForm>,
    confirm: ConfirmDialog,
    user_to_delete: Option<User>,
    subscription: Option<Subscription>,
}

impl ManagementPage {
    pub fn new(reconciler: Reconciler) -> Self {
        Self {
            reconciler,
            form: None,
            confirm: ConfirmDialog::closed(),
            user_to_delete: None,
            subscription: None,
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn users(&self) -> Vec<User> {
        self.reconciler.snapshot().into_vec()
    }

    /// Start listening on `topic` and load the snapshot.
    pub async fn mount(&mut self, channel: &PushChannel, topic: &str) -> Result<(), PushError> {
        if self.subscription.is_some() {
            return Ok(());
        }
        self.subscription = Some(self.reconciler.mount(channel, topic).await?);
        Ok(())
    }

    /// Stop listening. The list is left as it was.
    pub fn unmount(&mut self, channel: &PushChannel) -> Result<(), PushError> {
        match self.subscription.take() {
            Some(subscription) => self.reconciler.detach(channel, subscription),
            None => Ok(()),
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn handle_add(&mut self) {
        self.form = Some(UserForm::create());
    }

    pub fn handle_edit(&mut self, user: &User) {
        self.form = Some(UserForm::edit(user));
    }

    pub fn handle_delete_click(&mut self, user: &User) {
        self.user_to_delete = Some(user.clone());
        self.confirm = ConfirmDialog::for_delete(user);
    }

    pub fn handle_confirm_delete(&mut self) -> Option<JoinHandle<()>> {
        self.confirm.confirm();
        self.user_to_delete
            .take()
            .and_then(|user| user.id)
            .map(|id| self.reconciler.request_delete(id))
    }

    pub fn handle_cancel_delete(&mut self) {
        self.confirm.cancel();
        self.user_to_delete = None;
    }

    /// Dispatch the save and close the form.
    pub fn handle_save(&mut self, user: User) -> JoinHandle<()> {
        let editing = self.form.as_ref().is_some_and(UserForm::is_editing);
        self.form = None;
        if editing {
            self.reconciler.request_update(user)
        } else {
            self.reconciler.request_create(user)
        }
    }

    pub fn handle_cancel(&mut self) {
        self.form = None;
    }

    /// Submit the open form. A validation error keeps the form open.
    pub fn submit_form(&mut self) -> Result<Option<JoinHandle<()>>, FormError> {
        let Some(form) = self.form.as_ref() else {
            return Ok(None);
        };
        match form.submit()? {
            FormEvent::Save(user) => Ok(Some(self.handle_save(user))),
            FormEvent::Cancel => {
                self.handle_cancel();
                Ok(None)
            }
        }
    }

    pub fn form(&self) -> Option<&UserForm> {
        self.form.as_ref()
    }

    pub fn form_mut(&mut self) -> Option<&mut UserForm> {
        self.form.as_mut()
    }

    pub fn confirm_dialog(&self) -> &ConfirmDialog {
        &self.confirm
    }

    pub fn pending_delete(&self) -> Option<&User> {
        self.user_to_delete.as_ref()
    }
}
