use crate::config::AnswerPolicy;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct DisplayedAnswer {
    text: String,
    revision: u64,
    /// Sequence number of the request whose answer is shown.
    shown_seq: Option<u64>,
}

/// The single shared answer slot. Clones share the same value.
#[derive(Clone, Debug, Default)]
pub struct AnswerSlot {
    inner: Arc<Mutex<DisplayedAnswer>>,
    policy: AnswerPolicy,
}

impl AnswerSlot {
    pub fn new(policy: AnswerPolicy) -> Self {
        Self {
            inner: Arc::default(),
            policy,
        }
    }

    /// Writes the answer of request `seq`. Returns false when the policy
    /// drops it as stale.
    pub fn publish(&self, seq: u64, text: String) -> bool {
        let mut slot = self.lock();
        if self.policy == AnswerPolicy::LatestSent
            && slot.shown_seq.is_some_and(|shown| shown > seq)
        {
            return false;
        }
        slot.text = text;
        slot.shown_seq = Some(seq);
        slot.revision += 1;
        true
    }

    pub fn current(&self) -> String {
        self.lock().text.clone()
    }

    /// Increments on every accepted write.
    pub fn revision(&self) -> u64 {
        self.lock().revision
    }

    fn lock(&self) -> MutexGuard<'_, DisplayedAnswer> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub fn render_answer(slot: &AnswerSlot) -> String {
    slot.current()
}
