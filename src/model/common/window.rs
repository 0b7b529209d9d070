use chrono::{DateTime, Duration, Utc};

/// How long after publication a question counts as recent.
pub fn recent_period() -> Duration {
    Duration::days(1)
}

/// The period during which a question is visible and open for votes.
///
/// A question is published from `pub_date` onwards. It accepts votes while
/// published and, if `end_date` is set, strictly before `end_date`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VotingWindow {
    pub pub_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
}

impl VotingWindow {
    pub fn new(pub_date: DateTime<Utc>, end_date: Option<DateTime<Utc>>) -> Self {
        Self { pub_date, end_date }
    }

    pub fn is_published_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.pub_date
    }

    pub fn can_vote_at(&self, now: DateTime<Utc>) -> bool {
        match self.end_date {
            None => self.is_published_at(now),
            Some(end_date) => self.is_published_at(now) && now < end_date,
        }
    }

    /// Published no more than [`recent_period`] ago, both ends inclusive.
    pub fn was_published_recently_at(&self, now: DateTime<Utc>) -> bool {
        self.pub_date <= now && now <= self.pub_date + recent_period()
    }
}
