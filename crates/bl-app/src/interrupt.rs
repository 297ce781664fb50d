//! Operator interrupts and the stabilization wait.
//!
//! An interrupt never cancels anything by itself. The orchestrator notices
//! the raised flag at its next check point and asks the operator once
//! whether to continue; a second interrupt during the same wait aborts.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::error::{AppError, AppResult};

const POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Default)]
struct Flags {
    raised: AtomicBool,
    stop: AtomicBool,
}

/// Shared interrupt request, raised from a signal handler or another thread.
///
/// A stop request is an interrupt that has already been answered with
/// abort; it is never cleared.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<Flags>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.raised.store(true, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.0.raised.load(Ordering::Acquire)
    }

    /// Clear the flag, returning whether it was raised.
    pub fn take(&self) -> bool {
        self.0.raised.swap(false, Ordering::AcqRel)
    }

    pub fn request_stop(&self) {
        self.0.stop.store(true, Ordering::Release);
    }

    pub fn stop_requested(&self) -> bool {
        self.0.stop.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Abort,
}

/// Asks the operator what to do after an interrupt.
pub trait OperatorPrompt: Send {
    fn ask(&mut self, question: &str) -> Decision;
}

/// Non-interactive prompt with a fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub Decision);

impl OperatorPrompt for FixedAnswer {
    fn ask(&mut self, question: &str) -> Decision {
        info!(question, answer = ?self.0, "operator prompt answered automatically");
        self.0
    }
}

/// Handle the flag at a check point outside a wait. A raised flag always
/// prompts.
pub fn check_interrupt(flag: &InterruptFlag, prompt: &mut dyn OperatorPrompt) -> AppResult<()> {
    if flag.stop_requested() {
        return Err(AppError::StopRequested);
    }
    if !flag.take() {
        return Ok(());
    }
    match prompt.ask("Interrupted. Continue the experiment?") {
        Decision::Continue => {
            info!("operator chose to continue");
            Ok(())
        }
        Decision::Abort => Err(AppError::Interrupted),
    }
}

/// Block for `duration` unless the operator aborts.
///
/// The first interrupt prompts; on `Continue` the remaining time is waited
/// out. Any further interrupt in the same wait aborts without asking.
pub fn wait_interruptible(
    duration: Duration,
    flag: &InterruptFlag,
    prompt: &mut dyn OperatorPrompt,
) -> AppResult<()> {
    let deadline = Instant::now() + duration;
    let mut prompted = false;
    loop {
        if flag.stop_requested() {
            return Err(AppError::StopRequested);
        }
        if flag.take() {
            if prompted {
                warn!("second interrupt during wait, aborting");
                return Err(AppError::Interrupted);
            }
            prompted = true;
            match prompt.ask("Interrupted during stabilization. Continue waiting?") {
                Decision::Continue => info!("operator chose to continue"),
                Decision::Abort => return Err(AppError::Interrupted),
            }
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }
        thread::sleep((deadline - now).min(POLL));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counting {
        answer: Decision,
        asked: u32,
    }

    impl OperatorPrompt for Counting {
        fn ask(&mut self, _question: &str) -> Decision {
            self.asked += 1;
            self.answer
        }
    }

    #[test]
    fn quiet_wait_runs_to_deadline() {
        let flag = InterruptFlag::new();
        let mut prompt = Counting {
            answer: Decision::Abort,
            asked: 0,
        };
        let start = Instant::now();
        wait_interruptible(Duration::from_millis(30), &flag, &mut prompt).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(prompt.asked, 0);
    }

    #[test]
    fn abort_answer_ends_wait() {
        let flag = InterruptFlag::new();
        flag.raise();
        let mut prompt = Counting {
            answer: Decision::Abort,
            asked: 0,
        };
        let start = Instant::now();
        let err = wait_interruptible(Duration::from_secs(5), &flag, &mut prompt).unwrap_err();
        assert!(matches!(err, AppError::Interrupted));
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(prompt.asked, 1);
    }

    #[test]
    fn continue_then_second_interrupt_aborts() {
        let flag = InterruptFlag::new();
        flag.raise();
        let mut prompt = Counting {
            answer: Decision::Continue,
            asked: 0,
        };
        let raiser = {
            let flag = flag.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(120));
                flag.raise();
            })
        };
        let err = wait_interruptible(Duration::from_secs(5), &flag, &mut prompt).unwrap_err();
        raiser.join().unwrap();
        assert!(matches!(err, AppError::Interrupted));
        assert_eq!(prompt.asked, 1);
    }

    #[test]
    fn check_point_prompts_only_when_raised() {
        let flag = InterruptFlag::new();
        let mut prompt = FixedAnswer(Decision::Continue);
        check_interrupt(&flag, &mut prompt).unwrap();
        flag.raise();
        check_interrupt(&flag, &mut prompt).unwrap();
        assert!(!flag.is_raised());
    }

    #[test]
    fn stop_request_ends_wait_without_prompt() {
        let flag = InterruptFlag::new();
        flag.request_stop();
        let mut prompt = Counting {
            answer: Decision::Continue,
            asked: 0,
        };
        let err = wait_interruptible(Duration::from_secs(5), &flag, &mut prompt).unwrap_err();
        assert!(matches!(err, AppError::StopRequested));
        assert!(matches!(
            check_interrupt(&flag, &mut prompt),
            Err(AppError::StopRequested)
        ));
        assert_eq!(prompt.asked, 0);
    }
}
