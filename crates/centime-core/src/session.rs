//! Allocation session: the state machine governing how one spending
//! record's splits are created, validated, drafted, and released.
//!
//! One session exists per opened spending record. The session owns the
//! in-memory line list, the entry form, and a single authoritative
//! [`SessionState`]; UI affordances (can save, can release) derive from
//! that state and never the other way around. Every remote interaction
//! runs through the session's [`ExclusiveQueue`], so a save triggered by
//! one action can never interleave its store calls with a removal
//! triggered by the next.
//!
//! Business rules:
//! - a draft can be saved only from `Balanced`;
//! - a draft can be released only from `Drafted`;
//! - any modification after a draft exists deletes the draft document;
//! - after a successful save the state is `Drafted`;
//! - an add that settles the remainder to zero auto-saves immediately.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use centime_config::ReopenMode;
use centime_domain::{
    round2, round2_sum, AllocationDocument, AllocationLine, SpendingRecord, DEFAULT_COMMENT,
};
use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::queue::{ExclusiveQueue, QueueClosed};
use crate::store::{find_by_name, AllocationFolders, DocumentStore, StoreError};

/// Authoritative session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No allocation lines.
    Empty,
    /// Lines exist, remainder is non-zero.
    Editing,
    /// Lines exist, remainder is zero, nothing persisted yet.
    Balanced,
    /// A draft document in the store mirrors memory.
    Drafted,
    /// A released document was loaded; no mutation permitted.
    ReadOnly,
    /// A remote operation is in flight.
    Busy,
}

/// Which remote operation the session is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyAction {
    Load,
    Save,
    Release,
}

/// How a released document with no surviving draft is handled on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReopenPolicy {
    /// Load the released document read-only.
    #[default]
    ReadOnly,
    /// Move the released document back into drafts and edit it.
    ReopenAsDraft,
}

impl From<ReopenMode> for ReopenPolicy {
    fn from(mode: ReopenMode) -> Self {
        match mode {
            ReopenMode::ReadOnly => ReopenPolicy::ReadOnly,
            ReopenMode::ReopenAsDraft => ReopenPolicy::ReopenAsDraft,
        }
    }
}

/// Entry form for the next allocation line.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationForm {
    pub category_id: Option<i64>,
    pub sub_category_id: Option<i64>,
    pub comment: String,
    pub amount: f64,
    pub allocation_date: Option<NaiveDate>,
}

#[derive(Debug)]
struct SessionInner {
    state: SessionState,
    lines: Vec<AllocationLine>,
    form: AllocationForm,
    busy: Option<BusyAction>,
    loading: bool,
}

impl SessionInner {
    fn total_allocated(&self) -> f64 {
        round2_sum(self.lines.iter().map(|line| line.amount))
    }

    fn remaining(&self, spending_amount: f64) -> f64 {
        round2(spending_amount - self.total_allocated())
    }

    fn is_balanced(&self, spending_amount: f64) -> bool {
        self.remaining(spending_amount) == 0.0
    }

    fn preset_amount(&mut self, spending_amount: f64) {
        self.form.amount = round2(self.remaining(spending_amount).abs());
    }

    fn reset_form(&mut self, spending_amount: f64) {
        self.form.category_id = None;
        self.form.sub_category_id = None;
        self.form.comment.clear();
        self.form.allocation_date = None;
        self.preset_amount(spending_amount);
    }

    /// Recomputes the state from line data alone. `Drafted` and `Busy`
    /// are earned by explicit transitions and never overwritten here.
    fn recompute_state(&mut self, spending_amount: f64) {
        if matches!(self.state, SessionState::Drafted | SessionState::Busy) {
            return;
        }
        if self.lines.is_empty() {
            self.state = SessionState::Empty;
            return;
        }
        self.state = if self.is_balanced(spending_amount) {
            SessionState::Balanced
        } else {
            SessionState::Editing
        };
    }

    /// Explicit post-mutation state, used where a transition must leave
    /// `Busy` (or `Drafted`) behind.
    fn settle_state(&mut self, spending_amount: f64) {
        self.state = if self.lines.is_empty() {
            SessionState::Empty
        } else if self.is_balanced(spending_amount) {
            SessionState::Balanced
        } else {
            SessionState::Editing
        };
    }
}

/// Everything a queued task needs, detached from the session borrow.
#[derive(Clone)]
struct TaskContext {
    store: Arc<dyn DocumentStore>,
    inner: Arc<Mutex<SessionInner>>,
    folders: AllocationFolders,
    document_name: String,
    spending_id: String,
    party_id: Option<i64>,
    spending_amount: f64,
    spending_date: NaiveDate,
    reopen: ReopenPolicy,
}

pub struct AllocationSession {
    context: TaskContext,
    queue: ExclusiveQueue,
}

impl AllocationSession {
    /// Opens a session for one spending record. Requires a running tokio
    /// runtime (the queue worker is spawned here).
    pub fn open(
        record: &SpendingRecord,
        store: Arc<dyn DocumentStore>,
        folders: AllocationFolders,
        reopen: ReopenPolicy,
    ) -> Self {
        Self::new(
            record.id.clone(),
            record.amount,
            record.party_id,
            record.date,
            store,
            folders,
            reopen,
        )
    }

    pub fn new(
        spending_id: String,
        spending_amount: f64,
        party_id: Option<i64>,
        spending_date: NaiveDate,
        store: Arc<dyn DocumentStore>,
        folders: AllocationFolders,
        reopen: ReopenPolicy,
    ) -> Self {
        let inner = SessionInner {
            state: SessionState::Empty,
            lines: Vec::new(),
            form: AllocationForm {
                category_id: None,
                sub_category_id: None,
                comment: String::new(),
                amount: round2(spending_amount.abs()),
                allocation_date: None,
            },
            busy: None,
            loading: true,
        };
        let document_name = format!("{spending_id}.json");
        Self {
            context: TaskContext {
                store,
                inner: Arc::new(Mutex::new(inner)),
                folders,
                document_name,
                spending_id,
                party_id,
                spending_amount,
                spending_date,
                reopen,
            },
            queue: ExclusiveQueue::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.context.lock()
    }

    // ---- observable state -------------------------------------------------

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn allocations(&self) -> Vec<AllocationLine> {
        self.lock().lines.clone()
    }

    pub fn total_allocated(&self) -> f64 {
        self.lock().total_allocated()
    }

    pub fn remaining_amount(&self) -> f64 {
        self.lock().remaining(self.context.spending_amount)
    }

    pub fn is_balanced(&self) -> bool {
        self.remaining_amount() == 0.0
    }

    pub fn can_save_draft(&self) -> bool {
        self.state() == SessionState::Balanced
    }

    pub fn can_release(&self) -> bool {
        self.state() == SessionState::Drafted
    }

    pub fn has_draft(&self) -> bool {
        self.state() == SessionState::Drafted
    }

    pub fn is_loading(&self) -> bool {
        self.lock().loading
    }

    pub fn busy_action(&self) -> Option<BusyAction> {
        self.lock().busy
    }

    pub fn is_busy(&self) -> bool {
        let inner = self.lock();
        inner.busy.is_some() || inner.state == SessionState::Busy
    }

    // ---- entry form -------------------------------------------------------

    pub fn form(&self) -> AllocationForm {
        self.lock().form.clone()
    }

    pub fn set_category(&self, category_id: Option<i64>) {
        self.lock().form.category_id = category_id;
    }

    pub fn set_sub_category(&self, sub_category_id: Option<i64>) {
        self.lock().form.sub_category_id = sub_category_id;
    }

    pub fn set_comment(&self, comment: impl Into<String>) {
        self.lock().form.comment = comment.into();
    }

    pub fn set_amount(&self, amount: f64) {
        self.lock().form.amount = amount;
    }

    pub fn set_allocation_date(&self, date: Option<NaiveDate>) {
        self.lock().form.allocation_date = date;
    }

    // ---- operations -------------------------------------------------------

    /// Loads existing state from the store: a draft wins over a released
    /// copy, a released copy is handled per the reopen policy, anything
    /// malformed resets to `Empty`. The loading flag spans the whole call
    /// so a view can show the indicator before the store is even probed.
    pub async fn load_draft(&self) -> Result<(), StoreError> {
        self.lock().loading = true;
        let ctx = self.context.clone();
        let outcome = self.queue.submit(async move {
            let result = ctx.load_documents().await;
            let mut inner = ctx.lock();
            inner.busy = None;
            inner.loading = false;
            result
        });
        outcome.await.map_err(queue_closed)?
    }

    /// Appends a line from the current form. No-op unless a category and
    /// subcategory are selected and the amount is finite and non-zero.
    /// The line's sign always follows the record's. Balancing the record
    /// triggers an immediate auto-save when the store is available.
    pub async fn add_allocation(&self) -> Result<(), StoreError> {
        let ctx = self.context.clone();
        let outcome = self.queue.submit(async move { ctx.add_allocation().await });
        outcome.await.map_err(queue_closed)?
    }

    /// Removes the line at `index`. Any removal invalidates a persisted
    /// draft; the state afterwards is never `Drafted`.
    pub async fn remove_allocation(&self, index: usize) -> Result<(), StoreError> {
        let ctx = self.context.clone();
        let outcome = self
            .queue
            .submit(async move { ctx.remove_allocation(index).await });
        outcome.await.map_err(queue_closed)?
    }

    /// Persists the draft document. No-op unless the state is exactly
    /// `Balanced` and the store is available.
    pub async fn save_draft(&self) -> Result<(), StoreError> {
        let ctx = self.context.clone();
        let outcome = self.queue.submit(async move { ctx.save_draft().await });
        outcome.await.map_err(queue_closed)?
    }

    /// Finalizes the draft into the released folder. No-op unless the
    /// state is exactly `Drafted` and the store is available.
    pub async fn release(&self) -> Result<(), StoreError> {
        let ctx = self.context.clone();
        let outcome = self.queue.submit(async move { ctx.release().await });
        outcome.await.map_err(queue_closed)?
    }
}

fn queue_closed(_: QueueClosed) -> StoreError {
    StoreError::Transport("allocation queue closed".into())
}

impl TaskContext {
    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    async fn load_documents(&self) -> Result<(), StoreError> {
        if !self.store.available() {
            return Ok(());
        }
        self.lock().busy = Some(BusyAction::Load);

        let mut draft = find_by_name(self.store(), &self.folders.drafts, &self.document_name).await?;
        if draft.is_none() && self.reopen == ReopenPolicy::ReopenAsDraft {
            let reopened = self.reopen_released().await?;
            if reopened {
                draft =
                    find_by_name(self.store(), &self.folders.drafts, &self.document_name).await?;
            }
        }

        if let Some(file) = draft {
            let raw = self.store.read(&file.id).await?;
            return Ok(self.adopt_lines(AllocationDocument::lines_from_value(
                &raw,
                self.spending_date,
            )));
        }

        if self.reopen == ReopenPolicy::ReadOnly {
            if let Some(file) =
                find_by_name(self.store(), &self.folders.released, &self.document_name).await?
            {
                let raw = self.store.read(&file.id).await?;
                let lines = AllocationDocument::lines_from_value(&raw, self.spending_date);
                let mut inner = self.lock();
                match lines {
                    Some(lines) => {
                        inner.lines = lines;
                        inner.state = SessionState::ReadOnly;
                        inner.preset_amount(self.spending_amount);
                    }
                    None => {
                        inner.lines.clear();
                        inner.state = SessionState::Empty;
                    }
                }
                return Ok(());
            }
        }

        let mut inner = self.lock();
        inner.lines.clear();
        inner.state = SessionState::Empty;
        Ok(())
    }

    /// Installs loaded draft lines, or resets cleanly when the document
    /// was malformed.
    fn adopt_lines(&self, lines: Option<Vec<AllocationLine>>) {
        let mut inner = self.lock();
        match lines {
            Some(lines) => {
                inner.lines = lines;
                inner.state = SessionState::Drafted;
                inner.preset_amount(self.spending_amount);
            }
            None => {
                inner.lines.clear();
                inner.state = SessionState::Empty;
            }
        }
    }

    /// Moves the released document back into drafts, verbatim.
    async fn reopen_released(&self) -> Result<bool, StoreError> {
        let Some(released) =
            find_by_name(self.store(), &self.folders.released, &self.document_name).await?
        else {
            return Ok(false);
        };
        let payload = self.store.read(&released.id).await?;
        let existing_draft =
            find_by_name(self.store(), &self.folders.drafts, &self.document_name).await?;
        self.store
            .write(
                &self.folders.drafts,
                &self.document_name,
                &payload,
                existing_draft.as_ref().map(|file| file.id.as_str()),
            )
            .await?;
        self.store.delete(&released.id).await?;
        Ok(true)
    }

    async fn add_allocation(&self) -> Result<(), StoreError> {
        let was_drafted;
        {
            let mut inner = self.lock();
            if inner.state == SessionState::ReadOnly {
                return Ok(());
            }
            let (Some(category_id), Some(sub_category_id)) =
                (inner.form.category_id, inner.form.sub_category_id)
            else {
                return Ok(());
            };
            let amount = inner.form.amount;
            if !amount.is_finite() || amount == 0.0 {
                return Ok(());
            }

            let signed = if self.spending_amount < 0.0 {
                -amount.abs()
            } else {
                amount.abs()
            };
            let trimmed = inner.form.comment.trim().to_string();
            let comment = if trimmed.is_empty() {
                DEFAULT_COMMENT.to_string()
            } else {
                trimmed
            };
            let allocation_date = inner.form.allocation_date.unwrap_or(self.spending_date);
            inner.lines.push(AllocationLine {
                id: Uuid::new_v4(),
                category_id,
                sub_category_id,
                comment,
                amount: round2(signed),
                allocation_date,
                allocated_tag_id: None,
            });
            inner.reset_form(self.spending_amount);
            was_drafted = inner.state == SessionState::Drafted;
        }

        if was_drafted {
            // the draft no longer mirrors memory; invalidate it first
            self.delete_draft_if_exists().await?;
            self.lock().state = SessionState::Editing;
        } else {
            self.lock().recompute_state(self.spending_amount);
        }

        // an add that settles the remainder auto-saves straight away
        if self.lock().state == SessionState::Balanced {
            if !self.store.available() {
                return Ok(());
            }
            {
                let mut inner = self.lock();
                inner.busy = Some(BusyAction::Save);
                inner.state = SessionState::Busy;
            }
            let result = self.write_draft_document().await;
            let mut inner = self.lock();
            inner.busy = None;
            result?;
            inner.state = SessionState::Drafted;
        }
        Ok(())
    }

    async fn remove_allocation(&self, index: usize) -> Result<(), StoreError> {
        {
            let mut inner = self.lock();
            if inner.state == SessionState::ReadOnly {
                return Ok(());
            }
            if index >= inner.lines.len() {
                return Ok(());
            }
            inner.lines.remove(index);
            inner.preset_amount(self.spending_amount);
        }

        // every removal invalidates whatever draft document may exist,
        // even when the list just became empty
        if self.store.available() {
            self.lock().state = SessionState::Busy;
            self.delete_draft_if_exists().await?;
        }

        self.lock().settle_state(self.spending_amount);
        Ok(())
    }

    async fn save_draft(&self) -> Result<(), StoreError> {
        {
            let mut inner = self.lock();
            if inner.state != SessionState::Balanced {
                return Ok(());
            }
            if !self.store.available() {
                return Ok(());
            }
            inner.busy = Some(BusyAction::Save);
            inner.state = SessionState::Busy;
        }
        let result = self.write_draft_document().await;
        let mut inner = self.lock();
        inner.busy = None;
        result?;
        inner.state = SessionState::Drafted;
        Ok(())
    }

    async fn release(&self) -> Result<(), StoreError> {
        {
            let mut inner = self.lock();
            if inner.state != SessionState::Drafted {
                return Ok(());
            }
            if !self.store.available() {
                return Ok(());
            }
            inner.busy = Some(BusyAction::Release);
            inner.state = SessionState::Busy;
        }
        let result = self.release_documents().await;
        self.lock().busy = None;
        result
    }

    async fn release_documents(&self) -> Result<(), StoreError> {
        let Some(draft) =
            find_by_name(self.store(), &self.folders.drafts, &self.document_name).await?
        else {
            // the machine believed a draft existed; recover locally
            tracing::warn!(
                spending_id = %self.spending_id,
                "draft missing during release, falling back to local state"
            );
            self.lock().settle_state(self.spending_amount);
            return Ok(());
        };

        let existing_released =
            find_by_name(self.store(), &self.folders.released, &self.document_name).await?;
        let lines = self.lock().lines.clone();
        let document = AllocationDocument::released(
            self.spending_id.clone(),
            self.party_id,
            self.spending_amount,
            lines,
            Utc::now(),
        );
        let payload = encode(&document)?;
        self.store
            .write(
                &self.folders.released,
                &self.document_name,
                &payload,
                existing_released.as_ref().map(|file| file.id.as_str()),
            )
            .await?;
        self.store.delete(&draft.id).await?;

        // no draft survives a release; the session never reloads the
        // released copy into itself
        self.lock().settle_state(self.spending_amount);
        Ok(())
    }

    /// Upserts the draft document: the existing file id is looked up by
    /// name so repeated saves patch one document instead of duplicating.
    async fn write_draft_document(&self) -> Result<(), StoreError> {
        if !self.store.available() {
            return Ok(());
        }
        let existing =
            find_by_name(self.store(), &self.folders.drafts, &self.document_name).await?;
        let lines = self.lock().lines.clone();
        let document =
            AllocationDocument::draft(self.spending_id.clone(), self.party_id, lines, Utc::now());
        let payload = encode(&document)?;
        self.store
            .write(
                &self.folders.drafts,
                &self.document_name,
                &payload,
                existing.as_ref().map(|file| file.id.as_str()),
            )
            .await?;
        Ok(())
    }

    async fn delete_draft_if_exists(&self) -> Result<(), StoreError> {
        if !self.store.available() {
            return Ok(());
        }
        let Some(existing) =
            find_by_name(self.store(), &self.folders.drafts, &self.document_name).await?
        else {
            return Ok(());
        };
        self.store.delete(&existing.id).await
    }
}

fn encode(document: &AllocationDocument) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(document).map_err(|err| StoreError::Malformed(err.to_string()))
}
