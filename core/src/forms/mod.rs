//! Create, edit and borrow forms.
//!
//! # Design
//! Each form is a small state machine, `Editing -> Submitting -> Succeeded`,
//! falling back to `Editing` when the server rejects the write. Drafts hold
//! raw user input; validation turns a draft into a typed request payload or
//! a list of per-field errors, and nothing reaches the store until it
//! passes. A failed submission keeps the draft untouched so the user can
//! correct it and resubmit.

mod book;
mod borrow;

use std::fmt;

use thiserror::Error;

pub use book::{BookDraft, CreateBookFlow, EditBookFlow};
pub use borrow::{BorrowBookFlow, BorrowDraft};

use crate::endpoint::Mutation;
use crate::shell::{Notification, Route};
use crate::store::{MutationId, MutationStatus, QueryStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Title,
    Author,
    Genre,
    Isbn,
    Description,
    Copies,
    Quantity,
    DueDate,
}

impl Field {
    pub fn name(self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Author => "author",
            Field::Genre => "genre",
            Field::Isbn => "isbn",
            Field::Description => "description",
            Field::Copies => "copies",
            Field::Quantity => "quantity",
            Field::DueDate => "due_date",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        [
            Field::Title,
            Field::Author,
            Field::Genre,
            Field::Isbn,
            Field::Description,
            Field::Copies,
            Field::Quantity,
            Field::DueDate,
        ]
        .into_iter()
        .find(|field| field.name() == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: Field,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field.name(), self.message)
    }
}

/// Inline, per-field validation failures, ordered by field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("{}", join(.0))]
pub struct ValidationErrors(Vec<FieldError>);

fn join(errors: &[FieldError]) -> String {
    errors.iter().map(FieldError::to_string).collect::<Vec<_>>().join("; ")
}

impl ValidationErrors {
    pub fn push(&mut self, field: Field, message: impl Into<String>) {
        self.0.push(FieldError {
            field,
            message: message.into(),
        });
        self.0.sort_by_key(|e| e.field);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.0
    }

    /// First message for `field`, for rendering next to the input.
    pub fn get(&self, field: Field) -> Option<&str> {
        self.0.iter().find(|e| e.field == field).map(|e| e.message.as_str())
    }
}

impl From<validator::ValidationErrors> for ValidationErrors {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut out = ValidationErrors::default();
        for (name, failures) in errors.field_errors() {
            let Some(field) = Field::from_name(&name) else {
                continue;
            };
            for failure in failures {
                let message = failure
                    .message
                    .as_deref()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{} is invalid", field.name()));
                out.push(field, message);
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("validation failed: {0}")]
    Invalid(ValidationErrors),
    #[error("a submission is already in progress")]
    Busy,
    #[error("the book has not loaded yet")]
    NotLoaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormState {
    Editing,
    Submitting(MutationId),
    Succeeded,
}

/// What the view should do once a submission settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowOutcome {
    pub notification: Notification,
    pub navigate: Option<Route>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormKind {
    CreateBook,
    EditBook,
    BorrowBook,
}

impl FormKind {
    fn verb(self) -> &'static str {
        match self {
            FormKind::CreateBook => "create",
            FormKind::EditBook => "update",
            FormKind::BorrowBook => "borrow",
        }
    }

    fn success_message(self) -> &'static str {
        match self {
            FormKind::CreateBook => "Book created successfully!",
            FormKind::EditBook => "Book updated successfully!",
            FormKind::BorrowBook => "Book borrowed successfully!",
        }
    }

    fn follow_up(self) -> Route {
        match self {
            FormKind::CreateBook | FormKind::EditBook => Route::Books,
            FormKind::BorrowBook => Route::BorrowSummary,
        }
    }
}

/// Submission bookkeeping shared by every form.
#[derive(Debug, Clone)]
struct Submission {
    kind: FormKind,
    state: FormState,
    errors: ValidationErrors,
    last_error: Option<String>,
}

impl Submission {
    fn new(kind: FormKind) -> Self {
        Self {
            kind,
            state: FormState::Editing,
            errors: ValidationErrors::default(),
            last_error: None,
        }
    }

    fn ensure_editing(&self) -> Result<(), SubmitError> {
        match self.state {
            FormState::Editing => Ok(()),
            FormState::Submitting(_) | FormState::Succeeded => Err(SubmitError::Busy),
        }
    }

    /// Record the validation result; on success hand the write to the store.
    fn begin(
        &mut self,
        store: &mut QueryStore,
        validated: Result<Mutation, ValidationErrors>,
    ) -> Result<MutationId, SubmitError> {
        self.ensure_editing()?;
        match validated {
            Ok(mutation) => {
                self.errors = ValidationErrors::default();
                let id = store.mutate(mutation);
                self.state = FormState::Submitting(id);
                Ok(id)
            }
            Err(errors) => {
                self.errors = errors.clone();
                Err(SubmitError::Invalid(errors))
            }
        }
    }

    fn poll(&mut self, store: &mut QueryStore) -> Option<FlowOutcome> {
        let FormState::Submitting(id) = self.state else {
            return None;
        };
        match store.take_mutation(id)? {
            MutationStatus::Pending => None,
            MutationStatus::Succeeded(_) => {
                self.state = FormState::Succeeded;
                self.last_error = None;
                Some(FlowOutcome {
                    notification: Notification::success(self.kind.success_message()),
                    navigate: Some(self.kind.follow_up()),
                })
            }
            MutationStatus::Failed(err) => {
                let message = err.user_message();
                self.state = FormState::Editing;
                self.last_error = Some(message.clone());
                Some(FlowOutcome {
                    notification: Notification::error(format!("Failed to {} book: {message}", self.kind.verb())),
                    navigate: None,
                })
            }
        }
    }
}

/// Accessors every flow exposes the same way.
macro_rules! submission_accessors {
    () => {
        pub fn state(&self) -> crate::forms::FormState {
            self.submission.state
        }

        pub fn is_submitting(&self) -> bool {
            matches!(self.submission.state, crate::forms::FormState::Submitting(_))
        }

        /// Errors from the last rejected submit attempt.
        pub fn field_errors(&self) -> &crate::forms::ValidationErrors {
            &self.submission.errors
        }

        /// Message of the last failed submission, cleared on success.
        pub fn last_error(&self) -> Option<&str> {
            self.submission.last_error.as_deref()
        }

        /// Settle a pending submission. Returns `Some` exactly once per
        /// submission.
        pub fn poll(&mut self, store: &mut crate::store::QueryStore) -> Option<crate::forms::FlowOutcome> {
            self.submission.poll(store)
        }
    };
}
pub(crate) use submission_accessors;
