//! Rebalance selection state machine
//!
//! The operator builds a rebalance one step at a time: outgoing channel,
//! incoming channel, amount and an optional fee ceiling. Channel selection is
//! an explicit [`Selection`] so an incoming channel can never exist without an
//! outgoing one. Every transition either applies completely or is rejected
//! with the state left untouched.

use crate::node::{Channel, RebalanceRequest};
use serde::Serialize;

/// Reason a transition was refused
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejected {
    /// A rebalance is in flight
    #[error("a rebalance is in progress")]
    Blocked,
    /// The outgoing channel is already chosen
    #[error("an outgoing channel is already chosen")]
    OutgoingAlreadyChosen,
    /// The incoming channel needs an outgoing channel first
    #[error("choose an outgoing channel first")]
    OutgoingNotChosen,
    /// The incoming channel is already chosen
    #[error("an incoming channel is already chosen")]
    IncomingAlreadyChosen,
    /// Incoming and outgoing must be different channels
    #[error("the incoming channel must differ from the outgoing channel")]
    SameChannel,
    /// Outgoing, incoming and amount are not all set
    #[error("outgoing channel, incoming channel and amount are required")]
    NotReady,
}

/// Channels chosen so far
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Selection {
    /// Nothing chosen
    #[default]
    Empty,
    /// Outgoing channel chosen
    OutgoingChosen {
        /// Channel liquidity leaves through
        outgoing: Channel,
    },
    /// Both channels chosen
    IncomingChosen {
        /// Channel liquidity leaves through
        outgoing: Channel,
        /// Channel liquidity comes back through
        incoming: Channel,
    },
}

/// Coarse state of an intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentState {
    /// Nothing chosen
    Empty,
    /// Outgoing channel chosen
    OutgoingChosen,
    /// Both channels chosen, amount missing
    IncomingChosen,
    /// Both channels and an amount chosen
    Ready,
}

/// A complete rebalance, frozen when the intent is committed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebalanceOrder {
    /// Channel liquidity leaves through
    pub outgoing: Channel,
    /// Channel liquidity comes back through
    pub incoming: Channel,
    /// Amount in satoshis
    pub amount_sats: u64,
    /// Fee ceiling in satoshis; `None` searches all routes
    pub max_fee_sats: Option<u64>,
}

impl RebalanceOrder {
    /// Request for the node
    pub fn to_request(&self) -> RebalanceRequest {
        RebalanceRequest {
            outgoing_channel_id: self.outgoing.id.clone(),
            incoming_channel_id: self.incoming.id.clone(),
            amount_sats: self.amount_sats,
            max_fee_sats: self.max_fee_sats,
        }
    }
}

/// The operator's rebalance being built
#[derive(Debug, Clone, Default)]
pub struct RebalanceIntent {
    selection: Selection,
    amount: Option<u64>,
    max_fee: Option<u64>,
    blocked: bool,
}

impl RebalanceIntent {
    /// Create an empty intent
    pub fn new() -> Self {
        Self::default()
    }

    /// Coarse state
    pub fn state(&self) -> IntentState {
        match (&self.selection, self.amount) {
            (Selection::Empty, _) => IntentState::Empty,
            (Selection::OutgoingChosen { .. }, _) => IntentState::OutgoingChosen,
            (Selection::IncomingChosen { .. }, None) => IntentState::IncomingChosen,
            (Selection::IncomingChosen { .. }, Some(_)) => IntentState::Ready,
        }
    }

    /// Current channel selection
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Chosen outgoing channel
    pub fn outgoing(&self) -> Option<&Channel> {
        match &self.selection {
            Selection::Empty => None,
            Selection::OutgoingChosen { outgoing } | Selection::IncomingChosen { outgoing, .. } => {
                Some(outgoing)
            }
        }
    }

    /// Chosen incoming channel
    pub fn incoming(&self) -> Option<&Channel> {
        match &self.selection {
            Selection::IncomingChosen { incoming, .. } => Some(incoming),
            _ => None,
        }
    }

    /// Amount in satoshis
    pub fn amount(&self) -> Option<u64> {
        self.amount
    }

    /// Fee ceiling in satoshis
    pub fn max_fee(&self) -> Option<u64> {
        self.max_fee
    }

    /// Whether a committed rebalance is in flight
    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    fn ensure_unblocked(&self) -> Result<(), Rejected> {
        if self.blocked {
            Err(Rejected::Blocked)
        } else {
            Ok(())
        }
    }

    /// Choose the channel liquidity leaves through
    pub fn choose_outgoing(&mut self, channel: Channel) -> Result<(), Rejected> {
        self.ensure_unblocked()?;
        match self.selection {
            Selection::Empty => {
                self.selection = Selection::OutgoingChosen { outgoing: channel };
                Ok(())
            }
            _ => Err(Rejected::OutgoingAlreadyChosen),
        }
    }

    /// Choose the channel liquidity comes back through
    pub fn choose_incoming(&mut self, channel: Channel) -> Result<(), Rejected> {
        self.ensure_unblocked()?;
        match &self.selection {
            Selection::Empty => Err(Rejected::OutgoingNotChosen),
            Selection::IncomingChosen { .. } => Err(Rejected::IncomingAlreadyChosen),
            Selection::OutgoingChosen { outgoing } if outgoing.id == channel.id => {
                Err(Rejected::SameChannel)
            }
            Selection::OutgoingChosen { outgoing } => {
                self.selection = Selection::IncomingChosen {
                    outgoing: outgoing.clone(),
                    incoming: channel,
                };
                Ok(())
            }
        }
    }

    /// Set the amount; zero counts as unset
    pub fn set_amount(&mut self, amount: Option<u64>) -> Result<(), Rejected> {
        self.ensure_unblocked()?;
        self.amount = amount.filter(|a| *a > 0);
        Ok(())
    }

    /// Set the fee ceiling; `Some(0)` and `None` are distinct
    pub fn set_max_fee(&mut self, max_fee: Option<u64>) -> Result<(), Rejected> {
        self.ensure_unblocked()?;
        self.max_fee = max_fee;
        Ok(())
    }

    /// Clear the outgoing channel, which also clears the incoming one
    pub fn reset_outgoing(&mut self) -> Result<(), Rejected> {
        self.ensure_unblocked()?;
        self.selection = Selection::Empty;
        Ok(())
    }

    /// Clear the incoming channel only
    pub fn reset_incoming(&mut self) -> Result<(), Rejected> {
        self.ensure_unblocked()?;
        if let Selection::IncomingChosen { outgoing, .. } = &self.selection {
            self.selection = Selection::OutgoingChosen {
                outgoing: outgoing.clone(),
            };
        }
        Ok(())
    }

    /// Clear everything and unblock
    pub fn reset_all(&mut self) {
        *self = Self::default();
    }

    /// Freeze a ready intent into an order and block further changes
    pub fn commit(&mut self) -> Result<RebalanceOrder, Rejected> {
        self.ensure_unblocked()?;
        let (outgoing, incoming, amount) = match (&self.selection, self.amount) {
            (Selection::IncomingChosen { outgoing, incoming }, Some(amount)) => {
                (outgoing.clone(), incoming.clone(), amount)
            }
            _ => return Err(Rejected::NotReady),
        };

        self.blocked = true;
        Ok(RebalanceOrder {
            outgoing,
            incoming,
            amount_sats: amount,
            max_fee_sats: self.max_fee,
        })
    }
}
