use std::borrow::Cow;

use chrono::NaiveDate;
use validator::{Validate, ValidationError};

use super::{submission_accessors, Field, FormKind, SubmitError, Submission, ValidationErrors};
use crate::endpoint::{Mutation, Query};
use crate::store::{MutationId, QueryStore, SubscriptionId};
use crate::types::{Book, BookId, CreateBorrow};

/// Raw input of the borrow form.
#[derive(Debug, Clone, PartialEq, Eq, Validate)]
pub struct BorrowDraft {
    #[validate(custom(function = "quantity_rule"))]
    pub quantity: String,
    #[validate(required(message = "Due Date is required"))]
    pub due_date: Option<NaiveDate>,
}

impl Default for BorrowDraft {
    fn default() -> Self {
        Self {
            quantity: "1".to_string(),
            due_date: None,
        }
    }
}

fn quantity_rule(raw: &str) -> Result<(), ValidationError> {
    let message = match raw.trim() {
        "" => "Quantity is required",
        trimmed => match trimmed.parse::<i64>() {
            Ok(n) if n >= 1 => return Ok(()),
            _ => "Quantity must be at least 1",
        },
    };
    let mut err = ValidationError::new("quantity");
    err.message = Some(Cow::from(message));
    Err(err)
}

impl BorrowDraft {
    /// Check the draft against the loaded book and build the request. The
    /// quantity may not exceed the book's current copy count.
    pub fn to_borrow(&self, book: &Book) -> Result<CreateBorrow, ValidationErrors> {
        let mut errors = match Validate::validate(self) {
            Ok(()) => ValidationErrors::default(),
            Err(errors) => ValidationErrors::from(errors),
        };
        let quantity = self.quantity.trim().parse::<u32>().ok();
        if let Some(n) = quantity {
            if n > book.copies {
                errors.push(
                    Field::Quantity,
                    format!("Quantity cannot exceed available copies ({})", book.copies),
                );
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }
        match (quantity, self.due_date) {
            (Some(quantity), Some(due_date)) => Ok(CreateBorrow {
                book: book.id.clone(),
                quantity,
                due_date,
            }),
            _ => {
                errors.push(Field::Quantity, "Quantity must be at least 1");
                Err(errors)
            }
        }
    }

    /// Whether the submit button is enabled.
    pub fn can_submit(&self, book: &Book) -> bool {
        self.to_borrow(book).is_ok()
    }
}

/// The borrow form, bound to the book being borrowed.
#[derive(Debug, Clone)]
pub struct BorrowBookFlow {
    pub draft: BorrowDraft,
    id: BookId,
    subscription: Option<SubscriptionId>,
    submission: Submission,
}

impl BorrowBookFlow {
    pub fn open(store: &mut QueryStore, id: BookId) -> Self {
        let subscription = store.subscribe(Query::GetBook(id.clone()));
        Self {
            draft: BorrowDraft::default(),
            id,
            subscription: Some(subscription),
            submission: Submission::new(FormKind::BorrowBook),
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

    pub fn can_submit(&self, store: &QueryStore) -> bool {
        !self.is_submitting() && self.book(store).is_some_and(|book| self.draft.can_submit(book))
    }

    pub fn submit(&mut self, store: &mut QueryStore) -> Result<MutationId, SubmitError> {
        let validated = match self.book(store) {
            Some(book) => self.draft.to_borrow(book).map(Mutation::CreateBorrow),
            None => return Err(SubmitError::NotLoaded),
        };
        self.submission.begin(store, validated)
    }

    pub fn close(&mut self, store: &mut QueryStore) {
        if let Some(subscription) = self.subscription.take() {
            store.unsubscribe(subscription);
        }
    }
}
