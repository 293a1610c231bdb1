//! Client-side response cache with tag invalidation and optimistic writes.
//!
//! # Design
//! `QueryStore` is an explicit object owned by the application: construct
//! one at start-up, drop (or [`QueryStore::clear`]) it at shutdown, and build
//! a fresh one per test. It never performs I/O. Subscribing to a query or
//! starting a mutation queues an [`OutgoingRequest`] in the outbox; the host
//! drains it with [`QueryStore::take_requests`], executes the requests, and
//! reports each result through [`QueryStore::complete`].
//!
//! Every state change happens inside a `&mut self` call, so a reader holding
//! `&QueryStore` can never observe an optimistic patch half-applied, or a
//! rollback half-undone.
//!
//! Entries are keyed by [`CacheKey`] and indexed by the [`Tag`]s their data
//! provides. Invalidating a tag stales every carrier: entries with
//! subscribers refetch exactly once, entries without subscribers are evicted.

use std::collections::{BTreeSet, HashMap, VecDeque};

use tracing::{debug, warn};

use crate::client::CatalogClient;
use crate::endpoint::{CacheKey, Mutation, MutationData, OptimisticEdit, Query, QueryData, Tag, Undo};
use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse};
use crate::transport::Transport;
use crate::types::BookId;

/// Correlates an outgoing request with its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MutationId(u64);

/// A request waiting in the outbox for the host to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingRequest {
    pub ticket: Ticket,
    pub request: HttpRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Loading,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationStatus {
    Pending,
    Succeeded(MutationData),
    Failed(ApiError),
}

/// One cached query result.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    query: Query,
    status: QueryStatus,
    data: Option<QueryData>,
    error: Option<ApiError>,
    subscribers: usize,
    stale: bool,
    tags: BTreeSet<Tag>,
    fetching: Option<Ticket>,
    refetch_queued: bool,
    /// Bumped on every change to `data`, authoritative or optimistic.
    version: u64,
    /// Bumped only when a server response replaces `data`.
    revision: u64,
    /// Distinguishes this entry from an earlier one evicted under the same key.
    generation: u64,
}

impl CacheEntry {
    fn new(query: Query, generation: u64) -> Self {
        Self {
            query,
            status: QueryStatus::Loading,
            data: None,
            error: None,
            subscribers: 0,
            stale: false,
            tags: BTreeSet::new(),
            fetching: None,
            refetch_queued: false,
            version: 0,
            revision: 0,
            generation,
        }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn status(&self) -> QueryStatus {
        self.status
    }

    pub fn data(&self) -> Option<&QueryData> {
        self.data.as_ref()
    }

    pub fn error(&self) -> Option<&ApiError> {
        self.error.as_ref()
    }

    pub fn subscribers(&self) -> usize {
        self.subscribers
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn is_fetching(&self) -> bool {
        self.fetching.is_some()
    }

    pub fn tags(&self) -> &BTreeSet<Tag> {
        &self.tags
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Settled data that no invalidation has touched since it arrived.
    fn is_fresh(&self) -> bool {
        self.status == QueryStatus::Success && !self.stale && self.fetching.is_none()
    }
}

/// Inverse edits recorded by an optimistic patch.
///
/// Consumed by [`QueryStore::rollback`]; rolling back an already rolled
/// back (or committed) set does nothing.
#[derive(Debug, Default)]
pub struct PatchSet {
    patches: Vec<Patch>,
}

#[derive(Debug)]
struct Patch {
    key: CacheKey,
    generation: u64,
    revision: u64,
    undo: Undo,
}

impl PatchSet {
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    /// Keep the optimistic state; nothing is left to undo.
    pub fn commit(&mut self) {
        self.patches.clear();
    }
}

#[derive(Debug)]
enum InFlight {
    Query {
        key: CacheKey,
        generation: u64,
    },
    Mutation {
        id: MutationId,
        mutation: Mutation,
        patches: PatchSet,
    },
}

#[derive(Debug)]
pub struct QueryStore {
    client: CatalogClient,
    entries: HashMap<CacheKey, CacheEntry>,
    tag_index: HashMap<Tag, BTreeSet<CacheKey>>,
    subscriptions: HashMap<SubscriptionId, CacheKey>,
    in_flight: HashMap<Ticket, InFlight>,
    outbox: VecDeque<OutgoingRequest>,
    mutations: HashMap<MutationId, MutationStatus>,
    /// Books with an optimistic patch in flight, and the mutations parked
    /// behind it.
    locks: HashMap<BookId, VecDeque<(MutationId, Mutation)>>,
    next_id: u64,
}

impl QueryStore {
    pub fn new(client: CatalogClient) -> Self {
        Self {
            client,
            entries: HashMap::new(),
            tag_index: HashMap::new(),
            subscriptions: HashMap::new(),
            in_flight: HashMap::new(),
            outbox: VecDeque::new(),
            mutations: HashMap::new(),
            locks: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn client(&self) -> &CatalogClient {
        &self.client
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn entry(&self, query: &Query) -> Option<&CacheEntry> {
        self.entries.get(&query.key())
    }

    pub fn data(&self, query: &Query) -> Option<&QueryData> {
        self.entry(query).and_then(CacheEntry::data)
    }

    pub fn subscription_query(&self, id: SubscriptionId) -> Option<&Query> {
        let key = self.subscriptions.get(&id)?;
        self.entries.get(key).map(CacheEntry::query)
    }

    /// Keys currently carrying `tag`.
    pub fn tagged(&self, tag: &Tag) -> Vec<&CacheKey> {
        self.tag_index.get(tag).map(|keys| keys.iter().collect()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// No queued requests and nothing awaiting a result.
    pub fn is_idle(&self) -> bool {
        self.outbox.is_empty() && self.in_flight.is_empty()
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    /// Attach a subscriber to `query`, fetching it unless fresh data is
    /// cached or a fetch for the same key is already in flight.
    pub fn subscribe(&mut self, query: Query) -> SubscriptionId {
        let id = SubscriptionId(self.next_id());
        let generation = self.next_id();
        let key = query.key();
        self.subscriptions.insert(id, key.clone());

        let created = !self.entries.contains_key(&key);
        let needs_fetch = {
            let entry = self
                .entries
                .entry(key.clone())
                .or_insert_with(|| CacheEntry::new(query, generation));
            entry.subscribers += 1;
            if entry.fetching.is_some() {
                debug!(key = %key, subscribers = entry.subscribers, "attached to in-flight fetch");
                false
            } else {
                !entry.is_fresh()
            }
        };
        if created {
            self.reindex(&key);
        }
        if needs_fetch {
            self.start_fetch(&key);
        }
        id
    }

    /// Detach a subscriber. When the last one leaves, anything but fresh
    /// data is evicted; a fetch still in flight keeps running but its result
    /// will be discarded.
    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        let Some(key) = self.subscriptions.remove(&id) else {
            return;
        };
        let evict = match self.entries.get_mut(&key) {
            Some(entry) => {
                entry.subscribers = entry.subscribers.saturating_sub(1);
                entry.subscribers == 0 && !entry.is_fresh()
            }
            None => false,
        };
        if evict {
            debug!(key = %key, "last subscriber left, evicting");
            self.evict(&key);
        }
    }

    /// Evict every entry that has no subscribers.
    pub fn collect_unused(&mut self) -> usize {
        let unused: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.subscribers == 0)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &unused {
            self.evict(key);
        }
        unused.len()
    }

    /// Drop all state. Results still in flight will find nothing to update.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.tag_index.clear();
        self.subscriptions.clear();
        self.in_flight.clear();
        self.outbox.clear();
        self.mutations.clear();
        self.locks.clear();
    }

    // -----------------------------------------------------------------------
    // Invalidation
    // -----------------------------------------------------------------------

    /// Stale every entry carrying any of `tags`. Subscribed entries refetch
    /// once (after the current fetch, if one is in flight); unsubscribed
    /// entries are evicted.
    pub fn invalidate(&mut self, tags: &[Tag]) {
        let keys: BTreeSet<CacheKey> = tags
            .iter()
            .filter_map(|tag| self.tag_index.get(tag))
            .flatten()
            .cloned()
            .collect();
        debug!(tags = ?tags.iter().map(Tag::to_string).collect::<Vec<_>>(), entries = keys.len(), "invalidating");

        for key in keys {
            let Some(entry) = self.entries.get_mut(&key) else {
                continue;
            };
            if entry.subscribers == 0 {
                self.evict(&key);
                continue;
            }
            entry.stale = true;
            if entry.fetching.is_some() {
                entry.refetch_queued = true;
            } else {
                self.start_fetch(&key);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Start a write. Update and delete patch cached lists immediately; when
    /// the same book already has a patch in flight, the write is parked until
    /// that one resolves.
    pub fn mutate(&mut self, mutation: Mutation) -> MutationId {
        let id = MutationId(self.next_id());
        self.mutations.insert(id, MutationStatus::Pending);

        if let Some(edit) = mutation.optimistic() {
            let target = edit.target().clone();
            if let Some(waiting) = self.locks.get_mut(&target) {
                debug!(book = %target, "parked behind pending optimistic patch");
                waiting.push_back((id, mutation));
                return id;
            }
            self.locks.insert(target, VecDeque::new());
        }
        self.start_mutation(id, mutation);
        id
    }

    pub fn mutation(&self, id: MutationId) -> Option<&MutationStatus> {
        self.mutations.get(&id)
    }

    /// Remove and return a settled mutation's outcome. Pending mutations stay.
    pub fn take_mutation(&mut self, id: MutationId) -> Option<MutationStatus> {
        if matches!(self.mutations.get(&id), Some(MutationStatus::Pending) | None) {
            return None;
        }
        self.mutations.remove(&id)
    }

    /// Apply `edit` to every cached book list that holds its target.
    pub fn patch_books(&mut self, edit: &OptimisticEdit) -> PatchSet {
        let mut patches = Vec::new();
        for (key, entry) in self.entries.iter_mut() {
            let Some(QueryData::Books(books)) = entry.data.as_mut() else {
                continue;
            };
            if let Some(undo) = edit.apply(&mut books.data) {
                entry.version += 1;
                patches.push(Patch {
                    key: key.clone(),
                    generation: entry.generation,
                    revision: entry.revision,
                    undo,
                });
            }
        }
        for patch in &patches {
            self.reindex(&patch.key);
        }
        debug!(book = %edit.target(), lists = patches.len(), "optimistic patch applied");
        PatchSet { patches }
    }

    /// Undo a patch set. Lists whose data was since replaced by a server
    /// response are left alone: that response already reflects the truth.
    pub fn rollback(&mut self, patches: &mut PatchSet) {
        for patch in patches.patches.drain(..) {
            let restored = match self.entries.get_mut(&patch.key) {
                Some(entry) if entry.generation == patch.generation && entry.revision == patch.revision => {
                    match entry.data.as_mut() {
                        Some(QueryData::Books(books)) => {
                            patch.undo.revert(&mut books.data);
                            entry.version += 1;
                            true
                        }
                        _ => false,
                    }
                }
                _ => false,
            };
            if restored {
                self.reindex(&patch.key);
            } else {
                debug!(key = %patch.key, "skipping rollback, entry superseded");
            }
        }
    }

    fn start_mutation(&mut self, id: MutationId, mutation: Mutation) {
        let request = match mutation.request(&self.client) {
            Ok(request) => request,
            Err(err) => {
                warn!(endpoint = mutation.endpoint().name(), error = %err, "could not build request");
                self.mutations.insert(id, MutationStatus::Failed(err));
                self.release(&mutation);
                return;
            }
        };
        let patches = match mutation.optimistic() {
            Some(edit) => self.patch_books(&edit),
            None => PatchSet::default(),
        };
        let ticket = Ticket(self.next_id());
        debug!(endpoint = mutation.endpoint().name(), ticket = ticket.0, "mutation started");
        self.in_flight.insert(
            ticket,
            InFlight::Mutation {
                id,
                mutation,
                patches,
            },
        );
        self.outbox.push_back(OutgoingRequest { ticket, request });
    }

    fn finish_mutation(
        &mut self,
        id: MutationId,
        mutation: Mutation,
        mut patches: PatchSet,
        result: Result<HttpResponse, ApiError>,
    ) {
        match result.and_then(|response| mutation.parse(&self.client, response)) {
            Ok(data) => {
                debug!(endpoint = mutation.endpoint().name(), "mutation succeeded");
                patches.commit();
                self.mutations.insert(id, MutationStatus::Succeeded(data));
                self.invalidate(&mutation.invalidates());
            }
            Err(err) => {
                warn!(endpoint = mutation.endpoint().name(), error = %err, "mutation failed, rolling back");
                self.rollback(&mut patches);
                self.mutations.insert(id, MutationStatus::Failed(err));
            }
        }
        self.release(&mutation);
    }

    /// Hand the book's lock to the next parked mutation, or free it.
    fn release(&mut self, mutation: &Mutation) {
        let Some(edit) = mutation.optimistic() else {
            return;
        };
        let target = edit.target();
        let next = self.locks.get_mut(target).and_then(VecDeque::pop_front);
        match next {
            Some((id, next)) => self.start_mutation(id, next),
            None => {
                self.locks.remove(target);
            }
        }
    }

    // -----------------------------------------------------------------------
    // I/O boundary
    // -----------------------------------------------------------------------

    /// Drain the outbox. Each request must eventually be answered through
    /// [`QueryStore::complete`].
    pub fn take_requests(&mut self) -> Vec<OutgoingRequest> {
        self.outbox.drain(..).collect()
    }

    /// Deliver the result of an executed request.
    pub fn complete(&mut self, ticket: Ticket, result: Result<HttpResponse, ApiError>) {
        match self.in_flight.remove(&ticket) {
            Some(InFlight::Query { key, generation }) => self.finish_fetch(ticket, key, generation, result),
            Some(InFlight::Mutation {
                id,
                mutation,
                patches,
            }) => self.finish_mutation(id, mutation, patches, result),
            None => debug!(ticket = ticket.0, "result for unknown ticket ignored"),
        }
    }

    /// Execute queued requests through `transport` until nothing is left,
    /// including refetches triggered by the results. Returns how many
    /// requests were executed.
    pub fn run_until_idle<T: Transport + ?Sized>(&mut self, transport: &T) -> usize {
        let mut executed = 0;
        loop {
            let batch = self.take_requests();
            if batch.is_empty() {
                return executed;
            }
            for OutgoingRequest { ticket, request } in batch {
                let result = transport.execute(&request);
                self.complete(ticket, result);
                executed += 1;
            }
        }
    }

    fn start_fetch(&mut self, key: &CacheKey) {
        let ticket = Ticket(self.next_id());
        let Some(entry) = self.entries.get_mut(key) else {
            return;
        };
        entry.fetching = Some(ticket);
        entry.refetch_queued = false;
        if entry.data.is_none() {
            entry.status = QueryStatus::Loading;
        }
        let request = entry.query.request(&self.client);
        self.in_flight.insert(
            ticket,
            InFlight::Query {
                key: key.clone(),
                generation: entry.generation,
            },
        );
        debug!(key = %key, ticket = ticket.0, "fetch started");
        self.outbox.push_back(OutgoingRequest { ticket, request });
    }

    fn finish_fetch(&mut self, ticket: Ticket, key: CacheKey, generation: u64, result: Result<HttpResponse, ApiError>) {
        let refetch = {
            let Some(entry) = self.entries.get_mut(&key) else {
                debug!(key = %key, "discarding result for evicted entry");
                return;
            };
            if entry.generation != generation || entry.fetching != Some(ticket) {
                debug!(key = %key, "discarding superseded result");
                return;
            }
            entry.fetching = None;
            match result.and_then(|response| entry.query.parse(&self.client, response)) {
                Ok(data) => {
                    entry.data = Some(data);
                    entry.status = QueryStatus::Success;
                    entry.error = None;
                    entry.stale = entry.refetch_queued;
                    entry.version += 1;
                    entry.revision += 1;
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "fetch failed");
                    entry.status = QueryStatus::Error;
                    entry.error = Some(err);
                }
            }
            entry.refetch_queued
        };
        self.reindex(&key);
        if refetch {
            self.start_fetch(&key);
        }
    }

    // -----------------------------------------------------------------------
    // Tag index
    // -----------------------------------------------------------------------

    /// Recompute the entry's tags from its data and update the index.
    fn reindex(&mut self, key: &CacheKey) {
        let Some(entry) = self.entries.get_mut(key) else {
            return;
        };
        let tags = entry.query.provides(entry.data.as_ref());
        let old = std::mem::replace(&mut entry.tags, tags.clone());
        for tag in old.difference(&tags) {
            unindex(&mut self.tag_index, tag, key);
        }
        for tag in tags.difference(&old) {
            self.tag_index.entry(tag.clone()).or_default().insert(key.clone());
        }
    }

    fn evict(&mut self, key: &CacheKey) {
        if let Some(entry) = self.entries.remove(key) {
            for tag in &entry.tags {
                unindex(&mut self.tag_index, tag, key);
            }
        }
    }
}

fn unindex(index: &mut HashMap<Tag, BTreeSet<CacheKey>>, tag: &Tag, key: &CacheKey) {
    if let Some(keys) = index.get_mut(tag) {
        keys.remove(key);
        if keys.is_empty() {
            index.remove(tag);
        }
    }
}
