use std::borrow::Cow;

use tracing::debug;
use validator::{Validate, ValidationError};

use super::{submission_accessors, FormKind, SubmitError, Submission, ValidationErrors};
use crate::endpoint::{Mutation, Query};
use crate::store::{MutationId, QueryStore, SubscriptionId};
use crate::types::{Book, BookId, CreateBook, Genre, UpdateBook};

/// Raw input of the create and edit forms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Validate)]
pub struct BookDraft {
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, message = "Author is required"))]
    pub author: String,
    #[validate(required(message = "Genre is required"))]
    pub genre: Option<Genre>,
    #[validate(length(min = 1, message = "ISBN is required"))]
    pub isbn: String,
    pub description: String,
    #[validate(custom(function = "copies_rule"))]
    pub copies: String,
}

fn copies_rule(raw: &str) -> Result<(), ValidationError> {
    let message = if raw.is_empty() {
        "Copies is required"
    } else if raw.parse::<u32>().is_err() {
        "Copies must be a non-negative number"
    } else {
        return Ok(());
    };
    let mut err = ValidationError::new("copies");
    err.message = Some(Cow::from(message));
    Err(err)
}

impl BookDraft {
    pub fn from_book(book: &Book) -> Self {
        Self {
            title: book.title.clone(),
            author: book.author.clone(),
            genre: Some(book.genre),
            isbn: book.isbn.clone(),
            description: book.description.clone().unwrap_or_default(),
            copies: book.copies.to_string(),
        }
    }

    fn trimmed(&self) -> Self {
        Self {
            title: self.title.trim().to_string(),
            author: self.author.trim().to_string(),
            genre: self.genre,
            isbn: self.isbn.trim().to_string(),
            description: self.description.trim().to_string(),
            copies: self.copies.trim().to_string(),
        }
    }

    /// Check every field and build the create payload. Whitespace-only
    /// input counts as empty; an empty description is omitted.
    pub fn to_create(&self) -> Result<CreateBook, ValidationErrors> {
        let draft = self.trimmed();
        Validate::validate(&draft).map_err(ValidationErrors::from)?;

        let mut errors = ValidationErrors::default();
        let (Some(genre), Ok(copies)) = (draft.genre, draft.copies.parse::<u32>()) else {
            errors.push(super::Field::Copies, "Copies must be a non-negative number");
            return Err(errors);
        };
        Ok(CreateBook {
            title: draft.title,
            author: draft.author,
            genre,
            isbn: draft.isbn,
            description: (!draft.description.is_empty()).then_some(draft.description),
            copies,
        })
    }

    /// Validate, then express the draft as a full update. The description
    /// is always sent; an empty one clears it on the server.
    pub fn to_patch(&self) -> Result<UpdateBook, ValidationErrors> {
        let book = self.to_create()?;
        Ok(UpdateBook {
            title: Some(book.title),
            author: Some(book.author),
            genre: Some(book.genre),
            isbn: Some(book.isbn),
            description: Some(book.description.unwrap_or_default()),
            copies: Some(book.copies),
        })
    }
}

/// The "Add Book" form.
#[derive(Debug, Clone)]
pub struct CreateBookFlow {
    pub draft: BookDraft,
    submission: Submission,
}

impl Default for CreateBookFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl CreateBookFlow {
    pub fn new() -> Self {
        Self {
            draft: BookDraft::default(),
            submission: Submission::new(FormKind::CreateBook),
        }
    }

    submission_accessors!();

    pub fn submit(&mut self, store: &mut QueryStore) -> Result<MutationId, SubmitError> {
        let validated = self.draft.to_create().map(Mutation::CreateBook);
        self.submission.begin(store, validated)
    }
}

/// The "Edit Book" form, bound to one book's detail query.
#[derive(Debug, Clone)]
pub struct EditBookFlow {
    pub draft: BookDraft,
    id: BookId,
    subscription: Option<SubscriptionId>,
    synced_version: Option<u64>,
    submission: Submission,
}

impl EditBookFlow {
    /// Subscribe to the book. The draft stays empty until [`sync`] sees data.
    ///
    /// [`sync`]: EditBookFlow::sync
    pub fn open(store: &mut QueryStore, id: BookId) -> Self {
        let subscription = store.subscribe(Query::GetBook(id.clone()));
        Self {
            draft: BookDraft::default(),
            id,
            subscription: Some(subscription),
            synced_version: None,
            submission: Submission::new(FormKind::EditBook),
        }
    }

    pub fn id(&self) -> &BookId {
        &self.id
    }

    submission_accessors!();

    pub fn book<'s>(&self, store: &'s QueryStore) -> Option<&'s Book> {
        store
            .data(&Query::GetBook(self.id.clone()))
            .and_then(|data| data.as_book())
            .map(|resp| &resp.data)
    }

    /// Copy the loaded book into the draft the first time it is available
    /// and whenever the cached entry changes. Returns whether it did.
    pub fn sync(&mut self, store: &QueryStore) -> bool {
        let Some(entry) = store.entry(&Query::GetBook(self.id.clone())) else {
            return false;
        };
        let Some(book) = entry.data().and_then(|data| data.as_book()) else {
            return false;
        };
        if self.synced_version == Some(entry.version()) {
            return false;
        }
        debug!(book = %self.id, version = entry.version(), "populating edit form");
        self.draft = BookDraft::from_book(&book.data);
        self.synced_version = Some(entry.version());
        true
    }

    pub fn submit(&mut self, store: &mut QueryStore) -> Result<MutationId, SubmitError> {
        if self.book(store).is_none() {
            return Err(SubmitError::NotLoaded);
        }
        let validated = self.draft.to_patch().map(|patch| Mutation::UpdateBook {
            id: self.id.clone(),
            patch,
        });
        self.submission.begin(store, validated)
    }

    pub fn close(&mut self, store: &mut QueryStore) {
        if let Some(subscription) = self.subscription.take() {
            store.unsubscribe(subscription);
        }
    }
}
