use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Live,
    Playback,
}

impl Mode {
    fn bit(self) -> u64 {
        match self {
            Mode::Live => 0,
            Mode::Playback => 1,
        }
    }
}

fn pack(mode: Mode, epoch: u64) -> u64 {
    (epoch << 1) | mode.bit()
}

fn unpack(state: u64) -> (Mode, u64) {
    let mode = if state & 1 == 1 {
        Mode::Playback
    } else {
        Mode::Live
    };
    (mode, state >> 1)
}

/// Current mode plus an epoch that advances on every switch.
///
/// Both live in one atomic word so a reader always sees a matching pair.
/// Background work records the epoch it started under and drops its result
/// if the epoch has moved on by the time it would publish.
#[derive(Debug)]
pub struct ModeSwitch {
    state: AtomicU64,
}

impl ModeSwitch {
    pub fn new(mode: Mode) -> Self {
        Self {
            state: AtomicU64::new(pack(mode, 0)),
        }
    }

    pub fn current(&self) -> (Mode, u64) {
        unpack(self.state.load(Ordering::Acquire))
    }

    pub fn mode(&self) -> Mode {
        self.current().0
    }

    pub fn epoch(&self) -> u64 {
        self.current().1
    }

    /// The epoch live results should be published under, or `None` when
    /// the viewer is not in live mode.
    pub fn live_epoch(&self) -> Option<u64> {
        match self.current() {
            (Mode::Live, epoch) => Some(epoch),
            (Mode::Playback, _) => None,
        }
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.epoch() == epoch
    }

    /// Returns the epoch now in force. Switching to the mode already active
    /// leaves the epoch alone.
    pub fn switch(&self, mode: Mode) -> u64 {
        let prev = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| {
                let (current, epoch) = unpack(state);
                (current != mode).then(|| pack(mode, epoch + 1))
            });
        match prev {
            Ok(state) => {
                let epoch = unpack(state).1 + 1;
                tracing::info!(?mode, epoch, "mode switched");
                epoch
            }
            Err(state) => unpack(state).1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switching_bumps_epoch_once() {
        let modes = ModeSwitch::new(Mode::Live);
        let start = modes.epoch();

        assert_eq!(modes.switch(Mode::Live), start);
        let e1 = modes.switch(Mode::Playback);
        assert_eq!(e1, start + 1);
        assert_eq!(modes.switch(Mode::Playback), e1);
        assert_eq!(modes.current(), (Mode::Playback, e1));

        assert!(!modes.is_current(start));
        assert!(modes.is_current(e1));
    }

    #[test]
    fn live_epoch_only_in_live_mode() {
        let modes = ModeSwitch::new(Mode::Live);
        assert_eq!(modes.live_epoch(), Some(0));

        modes.switch(Mode::Playback);
        assert_eq!(modes.live_epoch(), None);

        let back = modes.switch(Mode::Live);
        assert_eq!(back, 2);
        assert_eq!(modes.live_epoch(), Some(2));
    }
}
