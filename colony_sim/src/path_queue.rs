// Asynchronous path request queue with per-agent backpressure.
//
// Each agent has at most one `PendingPathRequest`. A new request for a goal
// outside `goal_tolerance` of the pending one supersedes it: the agent's
// request counter advances and the old queue entry is dropped. A result
// computed for a superseded id may still come back from `pump` (it was
// already in flight). `complete` compares ids and silently drops it. This
// comparison is the only thing standing between stale results and agent
// state; there are no locks and no cancellation tokens.
//
// Lifecycle of one request:
//
//   request() --cache hit--> CacheHit (nothing queued)
//       |
//       +--miss--> Queued --take_batch--> InFlight --complete--> resolved
//                    |                        |
//                    +------issue_fallback----+--> FallbackIssued --complete--> resolved
//
// `issue_fallback` advances the request id as well, so a slow original
// arriving after the fallback result is dropped like any other stale one.
//
// Ordering: queued requests are serviced highest `PathPriority` first,
// then in arrival order (a global sequence number).
//
// See also: `navigator.rs` which pumps the queue (parallel A* via rayon)
// and routes resolutions back to agents, `path_cache.rs` consulted before
// queueing.
//
// **Critical constraint: determinism.** All maps are `BTreeMap`s keyed by
// `AgentId` or `(priority, sequence)`; timestamps come from the sim clock.

use crate::grid::TerrainCostGrid;
use crate::path_cache::{CacheKey, PathCache};
use crate::pathfinding::PathResult;
use crate::region::RegionVersionManager;
use crate::types::{AgentId, PathPriority, WorldPos};
use log::debug;
use std::cmp::Reverse;
use std::collections::BTreeMap;

type QueueKey = (Reverse<PathPriority>, u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestState {
    Queued,
    InFlight,
    FallbackIssued,
}

/// The single outstanding request of one agent.
#[derive(Clone, Debug)]
pub struct PendingPathRequest {
    pub start: WorldPos,
    pub target: WorldPos,
    pub request_id: u64,
    pub started_at_ms: u64,
    pub fallback_issued: bool,
    pub priority: PathPriority,
    pub state: RequestState,
    queue_key: Option<QueueKey>,
}

/// What an agent asks for.
#[derive(Clone, Copy, Debug)]
pub struct PathRequest {
    pub agent: AgentId,
    pub start: WorldPos,
    pub goal: WorldPos,
    pub priority: PathPriority,
}

/// A unit of work handed to a path finder.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PathJob {
    pub agent: AgentId,
    pub request_id: u64,
    pub start: WorldPos,
    pub goal: WorldPos,
    pub priority: PathPriority,
}

/// A committed result. `path` is `None` when no path exists.
#[derive(Clone, Debug, PartialEq)]
pub struct PathResolution {
    pub agent: AgentId,
    pub request_id: u64,
    pub goal: WorldPos,
    pub path: Option<PathResult>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RequestOutcome {
    /// Served from cache; any older pending request was superseded.
    CacheHit(PathResult),
    Queued { request_id: u64 },
    /// An equivalent request is already outstanding.
    AlreadyPending { request_id: u64 },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub enqueued: u64,
    pub superseded: u64,
    pub duplicates_suppressed: u64,
    pub stale_dropped: u64,
    pub fallbacks: u64,
}

#[derive(Debug)]
pub struct AsyncPathRequestQueue {
    goal_tolerance: f32,
    fallback_timeout_ms: u64,
    pending: BTreeMap<AgentId, PendingPathRequest>,
    /// Last request id handed out per agent. Never decreases.
    counters: BTreeMap<AgentId, u64>,
    queue: BTreeMap<QueueKey, AgentId>,
    next_seq: u64,
    stats: QueueStats,
}

impl AsyncPathRequestQueue {
    pub fn new(goal_tolerance: f32, fallback_timeout_ms: u64) -> Self {
        Self {
            goal_tolerance,
            fallback_timeout_ms,
            pending: BTreeMap::new(),
            counters: BTreeMap::new(),
            queue: BTreeMap::new(),
            next_seq: 0,
            stats: QueueStats::default(),
        }
    }

    fn next_request_id(&mut self, agent: AgentId) -> u64 {
        let counter = self.counters.entry(agent).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Remove the agent's pending request (and its queue slot) without
    /// touching the counter.
    fn drop_pending(&mut self, agent: AgentId) -> Option<PendingPathRequest> {
        let old = self.pending.remove(&agent)?;
        if let Some(key) = old.queue_key {
            self.queue.remove(&key);
        }
        Some(old)
    }

    /// Ask for a path. Checks the cache first; on a miss either recognizes
    /// an equivalent outstanding request or supersedes it with a new one.
    pub fn request(
        &mut self,
        req: PathRequest,
        cache: &mut PathCache,
        versions: &RegionVersionManager,
        grid: &TerrainCostGrid,
        now_ms: u64,
    ) -> RequestOutcome {
        let key = CacheKey::from_world(grid, req.start, req.goal);
        if let Some(path) = cache.check(key, versions) {
            if self.drop_pending(req.agent).is_some() {
                self.next_request_id(req.agent);
                self.stats.superseded += 1;
            }
            return RequestOutcome::CacheHit(path);
        }

        if let Some(existing) = self.pending.get(&req.agent)
            && existing.target.distance(req.goal) <= self.goal_tolerance
        {
            self.stats.duplicates_suppressed += 1;
            return RequestOutcome::AlreadyPending {
                request_id: existing.request_id,
            };
        }

        if let Some(old) = self.drop_pending(req.agent) {
            self.stats.superseded += 1;
            debug!(
                "{} supersedes path request #{} ({} -> {})",
                req.agent, old.request_id, old.target, req.goal
            );
        }
        let request_id = self.next_request_id(req.agent);
        let queue_key = (Reverse(req.priority), self.next_seq);
        self.next_seq += 1;
        self.queue.insert(queue_key, req.agent);
        self.pending.insert(
            req.agent,
            PendingPathRequest {
                start: req.start,
                target: req.goal,
                request_id,
                started_at_ms: now_ms,
                fallback_issued: false,
                priority: req.priority,
                state: RequestState::Queued,
                queue_key: Some(queue_key),
            },
        );
        self.stats.enqueued += 1;
        RequestOutcome::Queued { request_id }
    }

    /// Dequeue up to `budget` jobs, highest priority first, and mark them in
    /// flight.
    pub fn take_batch(&mut self, budget: usize) -> Vec<PathJob> {
        let mut jobs = Vec::with_capacity(budget.min(self.queue.len()));
        while jobs.len() < budget {
            let Some((_, agent)) = self.queue.pop_first() else {
                break;
            };
            let Some(pending) = self.pending.get_mut(&agent) else {
                continue;
            };
            pending.state = RequestState::InFlight;
            pending.queue_key = None;
            jobs.push(PathJob {
                agent,
                request_id: pending.request_id,
                start: pending.start,
                goal: pending.target,
                priority: pending.priority,
            });
        }
        jobs
    }

    /// Commit a computed result if it still answers the agent's current
    /// request. Stale results return `None`.
    pub fn complete(&mut self, job: &PathJob, path: Option<PathResult>) -> Option<PathResolution> {
        match self.pending.get(&job.agent) {
            Some(p) if p.request_id == job.request_id => {}
            _ => {
                self.stats.stale_dropped += 1;
                debug!("dropping stale path result #{} for {}", job.request_id, job.agent);
                return None;
            }
        }
        self.drop_pending(job.agent);
        Some(PathResolution {
            agent: job.agent,
            request_id: job.request_id,
            goal: job.goal,
            path,
        })
    }

    /// Whether the agent's request has waited past the fallback timeout
    /// without a fallback yet.
    pub fn fallback_due(&self, agent: AgentId, now_ms: u64) -> bool {
        self.pending.get(&agent).is_some_and(|p| {
            !p.fallback_issued && now_ms.saturating_sub(p.started_at_ms) >= self.fallback_timeout_ms
        })
    }

    /// Convert the agent's overdue request into a synchronous job under a
    /// fresh id. Whatever the original computation produces afterward is
    /// stale.
    pub fn issue_fallback(&mut self, agent: AgentId, now_ms: u64) -> Option<PathJob> {
        if !self.fallback_due(agent, now_ms) {
            return None;
        }
        let request_id = self.next_request_id(agent);
        let pending = self.pending.get_mut(&agent)?;
        if let Some(key) = pending.queue_key.take() {
            self.queue.remove(&key);
        }
        pending.request_id = request_id;
        pending.fallback_issued = true;
        pending.state = RequestState::FallbackIssued;
        self.stats.fallbacks += 1;
        Some(PathJob {
            agent,
            request_id,
            start: pending.start,
            goal: pending.target,
            priority: pending.priority,
        })
    }

    /// Abandon the agent's request. Any result still in flight becomes stale.
    pub fn cancel(&mut self, agent: AgentId) {
        if self.drop_pending(agent).is_some() {
            self.next_request_id(agent);
        }
    }

    pub fn pending(&self, agent: AgentId) -> Option<&PendingPathRequest> {
        self.pending.get(&agent)
    }

    pub fn is_current(&self, agent: AgentId, request_id: u64) -> bool {
        self.pending
            .get(&agent)
            .is_some_and(|p| p.request_id == request_id)
    }

    /// Requests waiting to be taken.
    pub fn depth(&self) -> usize {
        self.queue.len()
    }

    /// Agents with an outstanding request (queued, in flight or fallback).
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> QueueStats {
        self.stats
    }
}
