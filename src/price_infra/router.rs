use std::collections::{HashMap, HashSet};
use std::time::Duration;
use parking_lot::Mutex;
use serde::Serialize;
use crate::error::{Error, Result};
use crate::observability::metrics::SOURCE_FAILOVERS;
use crate::price_infra::SourceEntry;
use crate::types::ids::{InstrumentId, SourceId};
use crate::types::price::Price;
use crate::types::timestamp::Timestamp;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteDecision {
    Forward(Price),
    Drop(DropReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// A backup source reported while another source holds the turn.
    NotInTurn { rank: u32, in_turn: u32 },
    /// The in-turn source went quiet; the turn moved on and this tick is discarded.
    Failover { from_rank: u32, to_rank: u32 },
    UnknownInstrument,
    UnknownSource,
}

/// Diagnostic view of one instrument's failover state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RouterSnapshot {
    pub instrument: InstrumentId,
    pub current_rank: u32,
    pub in_turn_source: SourceId,
    /// `None` until the in-turn source has reported once.
    pub last_update: Option<Timestamp>,
}

#[derive(Debug)]
struct RouterState {
    current_rank: u32,
    last_update: Option<Timestamp>,
}

#[derive(Debug)]
struct InstrumentRoute {
    // Sorted by rank, ranks unique.
    sources: Vec<SourceEntry>,
    state: Mutex<RouterState>,
}

impl InstrumentRoute {
    fn rank_of(&self, source_id: &SourceId) -> Option<u32> {
        self.sources
            .iter()
            .find(|s| &s.source_id == source_id)
            .map(|s| s.rank)
    }

    fn source_at(&self, rank: u32) -> Option<&SourceEntry> {
        self.sources.iter().find(|s| s.rank == rank)
    }

    /// Next configured rank after `rank`, wrapping to the most preferred one.
    fn next_rank(&self, rank: u32) -> u32 {
        self.sources
            .iter()
            .map(|s| s.rank)
            .find(|&r| r > rank)
            .unwrap_or(self.sources[0].rank)
    }
}

/// Per-instrument failover over rank-ordered sources.
///
/// Only the in-turn source is forwarded. When the in-turn source reports after
/// staying silent for at least the switch delay, the turn advances to the next
/// rank and that tick is dropped.
#[derive(Debug)]
pub struct SourceRouter {
    routes: HashMap<InstrumentId, InstrumentRoute>,
    switch_delay: Duration,
}

/// Group catalog rows by instrument, each group sorted by rank.
///
/// Rejects an empty catalog, a source listed twice, and two sources of one
/// instrument sharing a rank.
pub fn group_catalog(entries: &[SourceEntry]) -> Result<HashMap<InstrumentId, Vec<SourceEntry>>> {
    if entries.is_empty() {
        return Err(Error::EmptyCatalog);
    }

    let mut seen = HashSet::new();
    let mut grouped: HashMap<InstrumentId, Vec<SourceEntry>> = HashMap::new();
    for entry in entries {
        if !seen.insert(entry.source_id.clone()) {
            return Err(Error::DuplicateSource(entry.source_id.clone()));
        }
        grouped.entry(entry.instrument.clone()).or_default().push(entry.clone());
    }

    for (instrument, sources) in grouped.iter_mut() {
        sources.sort_by_key(|s| s.rank);
        if let Some(pair) = sources.windows(2).find(|w| w[0].rank == w[1].rank) {
            return Err(Error::DuplicateRank {
                instrument: instrument.clone(),
                rank: pair[0].rank,
            });
        }
    }
    Ok(grouped)
}

impl SourceRouter {
    pub fn new(entries: &[SourceEntry], switch_delay: Duration) -> Result<Self> {
        let routes = group_catalog(entries)?
            .into_iter()
            .map(|(instrument, sources)| {
                let initial_rank = sources[0].rank;
                let route = InstrumentRoute {
                    sources,
                    state: Mutex::new(RouterState {
                        current_rank: initial_rank,
                        last_update: None,
                    }),
                };
                (instrument, route)
            })
            .collect();

        Ok(SourceRouter { routes, switch_delay })
    }

    pub fn evaluate(
        &self,
        instrument: &InstrumentId,
        source_id: &SourceId,
        price: Price,
        observed_at: Timestamp,
    ) -> RouteDecision {
        let Some(route) = self.routes.get(instrument) else {
            tracing::warn!(%instrument, source = %source_id, "tick for unknown instrument");
            return RouteDecision::Drop(DropReason::UnknownInstrument);
        };
        let Some(rank) = route.rank_of(source_id) else {
            tracing::warn!(%instrument, source = %source_id, "tick from source not registered for instrument");
            return RouteDecision::Drop(DropReason::UnknownSource);
        };

        let mut state = route.state.lock();
        if rank != state.current_rank {
            return RouteDecision::Drop(DropReason::NotInTurn {
                rank,
                in_turn: state.current_rank,
            });
        }

        // `None` means the source never reported: stale however early the clock.
        let elapsed = state.last_update.map(|last| observed_at - last);
        // Late ticks must not wind the staleness clock backwards.
        state.last_update = Some(state.last_update.map_or(observed_at, |last| last.max(observed_at)));

        if let Some(elapsed) = elapsed {
            if elapsed < self.switch_delay {
                return RouteDecision::Forward(price);
            }
        }

        let from_rank = state.current_rank;
        let to_rank = route.next_rank(from_rank);
        state.current_rank = to_rank;
        drop(state);

        if from_rank != to_rank {
            SOURCE_FAILOVERS.inc();
            tracing::warn!(
                %instrument,
                from_rank,
                to_rank,
                stale_for_ms = ?elapsed.map(|e| e.as_millis() as u64),
                "in-turn source went stale, switching source"
            );
        }
        RouteDecision::Drop(DropReason::Failover { from_rank, to_rank })
    }

    pub fn snapshot(&self, instrument: &InstrumentId) -> Option<RouterSnapshot> {
        let route = self.routes.get(instrument)?;
        let state = route.state.lock();
        let in_turn = route.source_at(state.current_rank)?;
        Some(RouterSnapshot {
            instrument: instrument.clone(),
            current_rank: state.current_rank,
            in_turn_source: in_turn.source_id.clone(),
            last_update: state.last_update,
        })
    }

    pub fn instruments(&self) -> impl Iterator<Item = &InstrumentId> {
        self.routes.keys()
    }
}
