//! Terminal presentation: views, dialogs and the management page controller.
//!
//! Nothing here owns the user list; views read it from the
//! [`Reconciler`](crate::reconciler::Reconciler) and hand user intents back to it.

pub mod confirm;
pub mod form;
pub mod page;
pub mod shell;
pub mod table;

pub use confirm::{Choice, ConfirmDialog};
pub use form::{FormError, FormEvent, UserForm};
pub use page::ManagementPage;
pub use shell::Shell;
pub use table::{print_sessions, print_table, render_sessions, render_table};
