// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of PuriSync.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Issue-order tickets used to drop stale completions.
//!
//! Every poll and command takes a [`Ticket`] when it is issued. A
//! [`FieldClock`] remembers the newest ticket applied to one group of fields
//! and refuses anything older, so a slow response can never overwrite a
//! value observed or commanded later.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(u64);

impl Ticket {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Monotonic ticket counter, starts at 1
#[derive(Debug, Default)]
pub struct TicketDispenser {
    issued: AtomicU64,
}

impl TicketDispenser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self) -> Ticket {
        Ticket(self.issued.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Newest ticket applied to one field group (0 = nothing applied yet)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldClock {
    applied: u64,
}

impl FieldClock {
    /// Record `ticket` and return true unless something newer was applied
    pub fn admit(&mut self, ticket: Ticket) -> bool {
        if ticket.0 < self.applied {
            return false;
        }
        self.applied = ticket.0;
        true
    }

    pub fn last_applied(&self) -> Option<Ticket> {
        (self.applied > 0).then_some(Ticket(self.applied))
    }
}
