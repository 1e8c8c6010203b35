//! Projection runner utilities (read model builders).
//!
//! Read models are **disposable**; events are the source of truth.
//! This module provides deterministic replay and cursor/version tracking
//! without making storage assumptions.

use farmstand_core::MarketId;

use crate::{EventEnvelope, Projection};

/// Tracks projection progress for a single market.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ProjectionCursor {
    market_id: MarketId,
    last_sequence_number: u64,
}

impl ProjectionCursor {
    pub fn market_id(&self) -> MarketId {
        self.market_id
    }

    pub fn last_sequence_number(&self) -> u64 {
        self.last_sequence_number
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    MarketMismatch { expected: MarketId, found: MarketId },
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Runs envelopes through a projection and tracks progress.
#[derive(Debug)]
pub struct ProjectionRunner<P>
where
    P: Projection,
{
    projection: P,
    cursor: Option<ProjectionCursor>,
}

impl<P> ProjectionRunner<P>
where
    P: Projection,
{
    pub fn new(projection: P) -> Self {
        Self {
            projection,
            cursor: None,
        }
    }

    /// Create a runner pinned to a specific market.
    ///
    /// This prevents accidentally starting a projection with an event from the
    /// wrong market.
    pub fn new_for_market(market_id: MarketId, projection: P) -> Self {
        Self {
            projection,
            cursor: Some(ProjectionCursor {
                market_id,
                last_sequence_number: 0,
            }),
        }
    }

    pub fn projection(&self) -> &P {
        &self.projection
    }

    pub fn projection_mut(&mut self) -> &mut P {
        &mut self.projection
    }

    pub fn into_projection(self) -> P {
        self.projection
    }

    /// Current cursor/version for this projection (if any envelopes were applied).
    pub fn cursor(&self) -> Option<ProjectionCursor> {
        self.cursor
    }

    /// Apply a single envelope, enforcing market consistency and monotonic
    /// sequencing.
    pub fn apply(&mut self, envelope: &EventEnvelope<P::Ev>) -> Result<(), ProjectionError> {
        let found_market = envelope.market_id();
        let found_seq = envelope.sequence_number();

        match self.cursor {
            None => {
                self.projection.apply(envelope);
                self.cursor = Some(ProjectionCursor {
                    market_id: found_market,
                    last_sequence_number: found_seq,
                });
                Ok(())
            }
            Some(mut c) => {
                if c.market_id != found_market {
                    return Err(ProjectionError::MarketMismatch {
                        expected: c.market_id,
                        found: found_market,
                    });
                }
                if found_seq <= c.last_sequence_number {
                    return Err(ProjectionError::NonMonotonicSequence {
                        last: c.last_sequence_number,
                        found: found_seq,
                    });
                }

                self.projection.apply(envelope);
                c.last_sequence_number = found_seq;
                self.cursor = Some(c);
                Ok(())
            }
        }
    }

    /// Apply many envelopes in order.
    pub fn run<'a>(
        &mut self,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<P::Ev>>,
    ) -> Result<(), ProjectionError>
    where
        P::Ev: 'a,
    {
        for env in envelopes {
            self.apply(env)?;
        }
        Ok(())
    }

    /// Rebuild a projection from scratch by replaying the full event history.
    ///
    /// The factory is used to create a fresh projection instance.
    pub fn rebuild_from_scratch<'a>(
        factory: impl FnOnce() -> P,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<P::Ev>>,
    ) -> Result<(P, Option<ProjectionCursor>), ProjectionError>
    where
        P::Ev: 'a,
    {
        let mut runner = ProjectionRunner::new(factory());
        runner.run(envelopes)?;
        Ok((runner.projection, runner.cursor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Event, MarketScoped, Projection};
    use chrono::{DateTime, Utc};
    use farmstand_core::AggregateId;
    use uuid::Uuid;

    #[derive(Debug, Clone)]
    struct Credited {
        amount: u64,
        occurred_at: DateTime<Utc>,
    }

    impl Event for Credited {
        fn event_type(&self) -> &'static str {
            "test.credited"
        }

        fn version(&self) -> u32 {
            1
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            self.occurred_at
        }
    }

    #[derive(Debug, Default)]
    struct TotalCredited {
        total: u64,
    }

    impl Projection for TotalCredited {
        type Ev = Credited;

        fn apply(&mut self, envelope: &EventEnvelope<Credited>) {
            self.total += envelope.payload().amount;
        }
    }

    fn is_for<M: MarketScoped>(message: &M, market_id: MarketId) -> bool {
        message.market_id() == market_id
    }

    fn envelope(market_id: MarketId, seq: u64, amount: u64) -> EventEnvelope<Credited> {
        EventEnvelope::new(
            Uuid::now_v7(),
            market_id,
            AggregateId::new(),
            "test.aggregate",
            seq,
            Credited {
                amount,
                occurred_at: Utc::now(),
            },
        )
    }

    #[test]
    fn applies_in_order_and_tracks_the_cursor() {
        let market_id = MarketId::new();
        let mut runner = ProjectionRunner::new_for_market(market_id, TotalCredited::default());

        runner.apply(&envelope(market_id, 1, 100)).unwrap();
        runner.apply(&envelope(market_id, 2, 250)).unwrap();

        assert_eq!(runner.projection().total, 350);
        let cursor = runner.cursor().unwrap();
        assert_eq!(cursor.market_id(), market_id);
        assert_eq!(cursor.last_sequence_number(), 2);
    }

    #[test]
    fn rejects_replays_and_foreign_markets() {
        let market_id = MarketId::new();
        let mut runner = ProjectionRunner::new_for_market(market_id, TotalCredited::default());

        runner.apply(&envelope(market_id, 1, 100)).unwrap();

        let replay = envelope(market_id, 1, 100);
        assert!(matches!(
            runner.apply(&replay).unwrap_err(),
            ProjectionError::NonMonotonicSequence { .. }
        ));

        let foreign = envelope(MarketId::new(), 2, 50);
        assert!(!is_for(&foreign, market_id));
        assert!(matches!(
            runner.apply(&foreign).unwrap_err(),
            ProjectionError::MarketMismatch { .. }
        ));

        // Rejected envelopes must not have touched the read model.
        assert_eq!(runner.projection().total, 100);
    }

    #[test]
    fn rebuilds_from_history() {
        let market_id = MarketId::new();
        let history = [envelope(market_id, 1, 10), envelope(market_id, 2, 20)];

        let (projection, cursor) =
            ProjectionRunner::rebuild_from_scratch(TotalCredited::default, history.iter())
                .unwrap();

        assert_eq!(projection.total, 30);
        assert_eq!(cursor.unwrap().last_sequence_number(), 2);
    }
}
