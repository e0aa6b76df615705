/// Decides whether a scheduled poll may proceed.
///
/// Three independent flags: an explicit pause (confirmation or edit open),
/// a fetch already in flight, and the view being hidden.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibilityGate {
    paused: bool,
    in_flight: bool,
    hidden: bool,
}

impl VisibilityGate {
    pub fn may_poll(&self) -> bool {
        !self.paused && !self.in_flight && !self.hidden
    }

    /// Returns whether the state changed.
    pub fn pause(&mut self) -> bool {
        !std::mem::replace(&mut self.paused, true)
    }

    /// Returns whether the state changed.
    pub fn unpause(&mut self) -> bool {
        std::mem::replace(&mut self.paused, false)
    }

    pub fn set_hidden(&mut self, hidden: bool) -> bool {
        std::mem::replace(&mut self.hidden, hidden) != hidden
    }

    /// Marks a fetch as started; false if one is already running.
    pub fn begin_fetch(&mut self) -> bool {
        !std::mem::replace(&mut self.in_flight, true)
    }

    pub fn end_fetch(&mut self) {
        self.in_flight = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn describe(&self) -> &'static str {
        if self.paused {
            "paused"
        } else if self.hidden {
            "hidden"
        } else if self.in_flight {
            "fetching"
        } else {
            "live"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_is_idempotent() {
        let mut g = VisibilityGate::default();
        assert!(g.pause());
        assert!(!g.pause());
        assert!(!g.may_poll());
        assert!(g.unpause());
        assert!(!g.unpause());
        assert!(g.may_poll());
    }

    #[test]
    fn each_flag_blocks() {
        let mut g = VisibilityGate::default();
        assert!(g.begin_fetch());
        assert!(!g.begin_fetch());
        assert!(!g.may_poll());
        g.end_fetch();

        assert!(g.set_hidden(true));
        assert!(!g.set_hidden(true));
        assert!(!g.may_poll());
        g.set_hidden(false);
        assert!(g.may_poll());
    }
}
