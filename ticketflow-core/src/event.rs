use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where an event sits relative to its sales window and date
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPhase {
    Upcoming,
    SalesOpen,
    SalesClosed,
    Finished,
}

/// A capacity-bearing event tickets are sold against.
///
/// The counts are only ever mutated through the inventory manager;
/// `available + reserved + sold == capacity` must hold at all times.
/// `reserved` tickets are earmarked for pending sales, neither on sale
/// nor yet counted as sold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketEvent {
    pub id: Uuid,
    pub description: String,
    pub price_cents: i64,
    pub capacity: u32,
    pub available: u32,
    pub reserved: u32,
    pub sold: u32,
    pub start_sales: DateTime<Utc>,
    pub end_sales: DateTime<Utc>,
    pub event_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl TicketEvent {
    /// Create an event with full availability after validating dates and price
    pub fn new(
        description: String,
        price_cents: i64,
        capacity: u32,
        start_sales: DateTime<Utc>,
        end_sales: DateTime<Utc>,
        event_date: DateTime<Utc>,
    ) -> Result<Self, EventValidationError> {
        let trimmed = description.trim();
        if trimmed.len() < 3 || trimmed.len() > 255 {
            return Err(EventValidationError::InvalidDescription);
        }
        if price_cents < 0 {
            return Err(EventValidationError::NegativePrice(price_cents));
        }
        if start_sales >= end_sales {
            return Err(EventValidationError::SalesStartAfterEnd);
        }
        if end_sales >= event_date {
            return Err(EventValidationError::SalesEndAfterEvent);
        }

        Ok(Self {
            id: Uuid::new_v4(),
            description: trimmed.to_string(),
            price_cents,
            capacity,
            available: capacity,
            reserved: 0,
            sold: 0,
            start_sales,
            end_sales,
            event_date,
            created_at: Utc::now(),
        })
    }

    /// Derived status relative to `now`
    pub fn phase_at(&self, now: DateTime<Utc>) -> EventPhase {
        if now >= self.event_date {
            EventPhase::Finished
        } else if now < self.start_sales {
            EventPhase::Upcoming
        } else if now <= self.end_sales {
            EventPhase::SalesOpen
        } else {
            EventPhase::SalesClosed
        }
    }

    pub fn sales_open_at(&self, now: DateTime<Utc>) -> bool {
        self.phase_at(now) == EventPhase::SalesOpen
    }

    /// Capacity invariant; trips after any mis-sequenced inventory mutation
    pub fn counts_consistent(&self) -> bool {
        self.available + self.reserved + self.sold == self.capacity
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventValidationError {
    #[error("Event description must be 3-255 characters")]
    InvalidDescription,

    #[error("Price cannot be negative: {0}")]
    NegativePrice(i64),

    #[error("Sales start date must be before end date")]
    SalesStartAfterEnd,

    #[error("Sales period must end before the event date")]
    SalesEndAfterEvent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn base_event() -> TicketEvent {
        let now = Utc::now();
        TicketEvent::new(
            "Rust Conf".to_string(),
            5_000,
            100,
            now - Duration::days(1),
            now + Duration::days(1),
            now + Duration::days(2),
        )
        .unwrap()
    }

    #[test]
    fn test_new_event_has_full_availability() {
        let event = base_event();
        assert_eq!(event.available, 100);
        assert_eq!(event.sold, 0);
        assert!(event.counts_consistent());
    }

    #[test]
    fn test_date_ordering_validated() {
        let now = Utc::now();
        let result = TicketEvent::new(
            "Rust Conf".to_string(),
            5_000,
            100,
            now + Duration::days(1),
            now - Duration::days(1),
            now + Duration::days(2),
        );
        assert!(matches!(result, Err(EventValidationError::SalesStartAfterEnd)));

        let result = TicketEvent::new(
            "Rust Conf".to_string(),
            5_000,
            100,
            now - Duration::days(1),
            now + Duration::days(3),
            now + Duration::days(2),
        );
        assert!(matches!(result, Err(EventValidationError::SalesEndAfterEvent)));
    }

    #[test]
    fn test_phase_follows_sales_window() {
        let event = base_event();
        assert_eq!(event.phase_at(event.start_sales - Duration::hours(1)), EventPhase::Upcoming);
        assert_eq!(event.phase_at(Utc::now()), EventPhase::SalesOpen);
        assert_eq!(event.phase_at(event.end_sales + Duration::hours(1)), EventPhase::SalesClosed);
        assert_eq!(event.phase_at(event.event_date), EventPhase::Finished);
    }
}
