//! Standalone transfer-leg failure events.
//!
//! Published when a leg targets an account with no history. There is no
//! aggregate to attach them to, so they go straight to the bus and never into
//! a stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use moneyflow_core::TransferId;
use moneyflow_events::Event;

/// Event: the debit leg found no source account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceAccountNotFound {
    pub transfer_id: TransferId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: the credit leg found no destination account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationAccountNotFound {
    pub transfer_id: TransferId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferLegEvent {
    SourceAccountNotFound(SourceAccountNotFound),
    DestinationAccountNotFound(DestinationAccountNotFound),
}

impl TransferLegEvent {
    pub fn source_not_found(transfer_id: TransferId, occurred_at: DateTime<Utc>) -> Self {
        Self::SourceAccountNotFound(SourceAccountNotFound {
            transfer_id,
            occurred_at,
        })
    }

    pub fn destination_not_found(transfer_id: TransferId, occurred_at: DateTime<Utc>) -> Self {
        Self::DestinationAccountNotFound(DestinationAccountNotFound {
            transfer_id,
            occurred_at,
        })
    }

    pub fn transfer_id(&self) -> TransferId {
        match self {
            TransferLegEvent::SourceAccountNotFound(e) => e.transfer_id,
            TransferLegEvent::DestinationAccountNotFound(e) => e.transfer_id,
        }
    }
}

impl Event for TransferLegEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TransferLegEvent::SourceAccountNotFound(_) => {
                "accounts.transfer.source_account_not_found"
            }
            TransferLegEvent::DestinationAccountNotFound(_) => {
                "accounts.transfer.destination_account_not_found"
            }
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TransferLegEvent::SourceAccountNotFound(e) => e.occurred_at,
            TransferLegEvent::DestinationAccountNotFound(e) => e.occurred_at,
        }
    }
}
