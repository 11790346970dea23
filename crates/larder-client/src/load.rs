use crate::error::Error;

/// Identifies one request started through [`Loadable::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

#[derive(Debug, Clone, Default, PartialEq)]
pub enum LoadState<T> {
    #[default]
    Idle,
    Pending,
    Ready(T),
    Failed(Error),
}

/// State of a fetch-on-mount request. Each request settles at most once;
/// results for a superseded request are dropped.
#[derive(Debug, Clone, Default)]
pub struct Loadable<T> {
    state: LoadState<T>,
    current: u64,
}

impl<T> Loadable<T> {
    pub fn new() -> Self {
        Self {
            state: LoadState::Idle,
            current: 0,
        }
    }

    /// Begin a new request. Any request still in flight is superseded.
    pub fn start(&mut self) -> Ticket {
        self.current += 1;
        self.state = LoadState::Pending;
        Ticket(self.current)
    }

    /// Record the outcome of `ticket`. Returns false when it was ignored.
    pub fn settle(&mut self, ticket: Ticket, result: Result<T, Error>) -> bool {
        if ticket.0 != self.current || !self.is_pending() {
            return false;
        }
        self.state = match result {
            Ok(value) => LoadState::Ready(value),
            Err(e) => LoadState::Failed(e),
        };
        true
    }

    pub fn state(&self) -> &LoadState<T> {
        &self.state
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, LoadState::Pending)
    }

    pub fn value(&self) -> Option<&T> {
        match &self.state {
            LoadState::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match &self.state {
            LoadState::Failed(e) => Some(e),
            _ => None,
        }
    }
}
