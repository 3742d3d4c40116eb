//! Escrow state machine.
//!
//! Drives an escrow through Pending → {Completed, Canceled}; both
//! terminal states are final. Each escrow is bound 1:1 to a trade offer,
//! and offer status moves in lock-step: Reserved while the escrow is
//! Pending, then Completed or Canceled with the escrow.
//!
//! All check-then-set logic runs as compare-and-set transactions in the
//! ledger, so two racing callers resolve deterministically: one wins,
//! the other gets a typed refusal.

use chrono::Utc;
use tracing::{info, warn};

use crate::store::{Ledger, ReserveOutcome, SettleOutcome};
use crate::types::{EscrowStatus, OfferStatus, RecordId, TradeError};

pub struct EscrowDesk {
    ledger: Ledger,
}

impl EscrowDesk {
    pub fn new(ledger: Ledger) -> Self {
        Self { ledger }
    }

    /// Open an escrow against an offer, reserving it.
    ///
    /// Fails with `NotFound` if the offer is absent, `InactiveOffer` if it
    /// is settled or past its expiration, and `Conflict` if a pending
    /// escrow already reserves it.
    pub async fn initiate_trade(&self, offer_id: RecordId) -> Result<RecordId, TradeError> {
        match self.ledger.reserve_offer(offer_id, Utc::now()).await? {
            ReserveOutcome::Reserved(escrow_id) => {
                info!(offer_id, escrow_id, "Trade initiated, offer reserved");
                Ok(escrow_id)
            }
            ReserveOutcome::OfferMissing => Err(TradeError::not_found("offer", offer_id)),
            ReserveOutcome::NotActive(OfferStatus::Reserved) => {
                warn!(offer_id, "Initiation refused: pending escrow exists");
                Err(TradeError::Conflict(offer_id))
            }
            ReserveOutcome::NotActive(_) | ReserveOutcome::Expired => {
                Err(TradeError::InactiveOffer(offer_id))
            }
        }
    }

    /// Release the escrowed trade: escrow → Completed, offer → Completed.
    /// This is the only path that marks funds as released.
    pub async fn complete_trade(&self, escrow_id: RecordId) -> Result<(), TradeError> {
        self.settle(escrow_id, EscrowStatus::Completed, OfferStatus::Completed)
            .await
    }

    /// Abort the escrowed trade: escrow → Canceled, offer → Canceled.
    pub async fn cancel_trade(&self, escrow_id: RecordId) -> Result<(), TradeError> {
        self.settle(escrow_id, EscrowStatus::Canceled, OfferStatus::Canceled)
            .await
    }

    async fn settle(
        &self,
        escrow_id: RecordId,
        to: EscrowStatus,
        offer_to: OfferStatus,
    ) -> Result<(), TradeError> {
        match self
            .ledger
            .settle_escrow(escrow_id, to, offer_to, Utc::now())
            .await?
        {
            SettleOutcome::Settled => {
                info!(escrow_id, status = %to, "Escrow settled");
                Ok(())
            }
            SettleOutcome::EscrowMissing => Err(TradeError::not_found("escrow", escrow_id)),
            SettleOutcome::AlreadyTerminal(from) => {
                warn!(escrow_id, %from, %to, "Illegal escrow transition refused");
                Err(TradeError::InvalidTransition { escrow: escrow_id, from, to })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    struct Fixture {
        ledger: Ledger,
        desk: EscrowDesk,
    }

    async fn fixture() -> Fixture {
        let ledger = Ledger::open("sqlite::memory:").await.unwrap();
        ledger.register_user("u-1").await.unwrap();
        Fixture {
            desk: EscrowDesk::new(ledger.clone()),
            ledger,
        }
    }

    impl Fixture {
        async fn open_offer(&self) -> RecordId {
            self.ledger
                .insert_offer("u-1", "SOL", dec!(100), "bank", Utc::now() + Duration::hours(1))
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn test_initiate_creates_pending_escrow() {
        let f = fixture().await;
        let offer_id = f.open_offer().await;

        let escrow_id = f.desk.initiate_trade(offer_id).await.unwrap();
        let escrow = f.ledger.get_escrow(escrow_id).await.unwrap().unwrap();
        assert_eq!(escrow.status, EscrowStatus::Pending);
        assert_eq!(escrow.offer_id, offer_id);

        let offer = f.ledger.get_offer(offer_id).await.unwrap().unwrap();
        assert_eq!(offer.status, OfferStatus::Reserved);
    }

    #[tokio::test]
    async fn test_double_initiate_conflicts() {
        let f = fixture().await;
        let offer_id = f.open_offer().await;

        f.desk.initiate_trade(offer_id).await.unwrap();
        let err = f.desk.initiate_trade(offer_id).await.unwrap_err();
        assert!(matches!(err, TradeError::Conflict(id) if id == offer_id));
    }

    #[tokio::test]
    async fn test_initiate_absent_offer() {
        let f = fixture().await;
        let err = f.desk.initiate_trade(12345).await.unwrap_err();
        assert!(matches!(err, TradeError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_initiate_expired_offer() {
        let f = fixture().await;
        let offer_id = f
            .ledger
            .insert_offer("u-1", "SOL", dec!(1), "bank", Utc::now() - Duration::seconds(5))
            .await
            .unwrap();

        let err = f.desk.initiate_trade(offer_id).await.unwrap_err();
        assert!(matches!(err, TradeError::InactiveOffer(id) if id == offer_id));
    }

    #[tokio::test]
    async fn test_initiate_settled_offer_is_inactive_not_conflict() {
        let f = fixture().await;
        let offer_id = f.open_offer().await;
        let escrow_id = f.desk.initiate_trade(offer_id).await.unwrap();
        f.desk.complete_trade(escrow_id).await.unwrap();

        let err = f.desk.initiate_trade(offer_id).await.unwrap_err();
        assert!(matches!(err, TradeError::InactiveOffer(_)));
    }

    #[tokio::test]
    async fn test_complete_marks_offer_completed() {
        let f = fixture().await;
        let offer_id = f.open_offer().await;
        let escrow_id = f.desk.initiate_trade(offer_id).await.unwrap();

        f.desk.complete_trade(escrow_id).await.unwrap();

        let escrow = f.ledger.get_escrow(escrow_id).await.unwrap().unwrap();
        assert_eq!(escrow.status, EscrowStatus::Completed);
        let offer = f.ledger.get_offer(offer_id).await.unwrap().unwrap();
        assert_eq!(offer.status, OfferStatus::Completed);
    }

    #[tokio::test]
    async fn test_complete_twice_fails_second_time() {
        let f = fixture().await;
        let escrow_id = {
            let offer_id = f.open_offer().await;
            f.desk.initiate_trade(offer_id).await.unwrap()
        };

        f.desk.complete_trade(escrow_id).await.unwrap();
        let err = f.desk.complete_trade(escrow_id).await.unwrap_err();
        assert!(matches!(
            err,
            TradeError::InvalidTransition { from: EscrowStatus::Completed, .. }
        ));
    }

    #[tokio::test]
    async fn test_cancel_twice_fails_second_time() {
        let f = fixture().await;
        let escrow_id = {
            let offer_id = f.open_offer().await;
            f.desk.initiate_trade(offer_id).await.unwrap()
        };

        f.desk.cancel_trade(escrow_id).await.unwrap();
        let err = f.desk.cancel_trade(escrow_id).await.unwrap_err();
        assert!(matches!(
            err,
            TradeError::InvalidTransition { from: EscrowStatus::Canceled, .. }
        ));
    }

    #[tokio::test]
    async fn test_complete_then_cancel_keeps_completed() {
        let f = fixture().await;
        let offer_id = f.open_offer().await;
        let escrow_id = f.desk.initiate_trade(offer_id).await.unwrap();

        f.desk.complete_trade(escrow_id).await.unwrap();
        let err = f.desk.cancel_trade(escrow_id).await.unwrap_err();
        assert!(matches!(err, TradeError::InvalidTransition { .. }));

        // The winner's terminal state sticks on both records
        let offer = f.ledger.get_offer(offer_id).await.unwrap().unwrap();
        assert_eq!(offer.status, OfferStatus::Completed);
        let escrow = f.ledger.get_escrow(escrow_id).await.unwrap().unwrap();
        assert_eq!(escrow.status, EscrowStatus::Completed);
    }

    #[tokio::test]
    async fn test_cancel_releases_offer_to_canceled() {
        let f = fixture().await;
        let offer_id = f.open_offer().await;
        let escrow_id = f.desk.initiate_trade(offer_id).await.unwrap();

        f.desk.cancel_trade(escrow_id).await.unwrap();
        let offer = f.ledger.get_offer(offer_id).await.unwrap().unwrap();
        assert_eq!(offer.status, OfferStatus::Canceled);
    }

    #[tokio::test]
    async fn test_settle_absent_escrow() {
        let f = fixture().await;
        assert!(matches!(
            f.desk.complete_trade(777).await.unwrap_err(),
            TradeError::NotFound { .. }
        ));
        assert!(matches!(
            f.desk.cancel_trade(777).await.unwrap_err(),
            TradeError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_concurrent_initiations_yield_one_winner() {
        let f = fixture().await;
        let offer_id = f.open_offer().await;
        let desk = std::sync::Arc::new(EscrowDesk::new(f.ledger.clone()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let desk = desk.clone();
            handles.push(tokio::spawn(async move { desk.initiate_trade(offer_id).await }));
        }

        let mut wins = 0;
        let mut conflicts = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => wins += 1,
                Err(TradeError::Conflict(_)) => conflicts += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(conflicts, 7);
    }
}
