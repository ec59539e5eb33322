//! Per-call diagnostic tags.
//!
//! Native client libraries log through their own channels, and several
//! composites may drive calls concurrently. Each call made through a pooled
//! proxy is wrapped in a [`CallTag`], which installs a short random id for the
//! current thread and restores the previous one when dropped, so native
//! diagnostics can be attributed to the logical caller.

use std::cell::RefCell;

use log::trace;
use rand::distributions::Alphanumeric;
use rand::Rng;

const TAG_PREFIX: &str = "SVN";
const TAG_LENGTH: usize = 5;

thread_local! {
    static CURRENT_CALL: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Returns the id of the call currently running on this thread, if any.
pub fn current_call_id() -> Option<String> {
    CURRENT_CALL.with(|current| current.borrow().clone())
}

/// Generates a fresh id such as `SVNa8K2z`.
pub fn generate_call_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TAG_LENGTH)
        .map(char::from)
        .collect();
    format!("{}{}", TAG_PREFIX, suffix)
}

/// Guard that tags the current thread for the duration of one call.
#[must_use = "the tag is removed as soon as the guard is dropped"]
pub struct CallTag {
    previous: Option<String>,
    id: String,
}

impl CallTag {
    /// Installs a fresh id for `verb`, remembering the previous one.
    pub fn enter(verb: &str) -> Self {
        let id = generate_call_id();
        let previous = CURRENT_CALL.with(|current| current.replace(Some(id.clone())));
        trace!("{} begins svn {}", id, verb);
        Self { previous, id }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for CallTag {
    fn drop(&mut self) {
        trace!("{} ends", self.id);
        let previous = self.previous.take();
        CURRENT_CALL.with(|current| {
            *current.borrow_mut() = previous;
        });
    }
}
