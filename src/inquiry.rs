//! Device inquiry.
//!
//! Responses reported by the stack are kept in a drop-oldest ring. An [`Inquiry`] reads them back in arrival order,
//! skipping any that were overwritten before it got to them, and ends once the stack has reported completion (or the
//! inquiry was cancelled) and every retained response has been delivered.

use tracing::{debug, trace};

use crate::bounded::HistoryRing;
use crate::error::ErrorKind;
use crate::stack::StackShared;
use crate::types::{DeviceRecord, InquiryAccessCode, InquiryOutcome};
use crate::{Error, Result, Stack};

#[derive(Debug)]
pub(crate) struct InquiryState {
    responded: HistoryRing<DeviceRecord>,
    active: bool,
    complete: bool,
    success: bool,
    terminated: bool,
    /// A cancel is still inside `stop_inquiry`. No new inquiry may start until it returns.
    stopping: bool,
}

impl InquiryState {
    pub fn new(capacity: usize) -> Self {
        InquiryState {
            responded: HistoryRing::new(capacity),
            active: false,
            complete: false,
            success: false,
            terminated: false,
            stopping: false,
        }
    }

    fn begin(&mut self) {
        self.responded.clear();
        self.active = true;
        self.complete = false;
        self.success = false;
        self.terminated = false;
    }

    fn outcome(&self) -> Option<InquiryOutcome> {
        if self.terminated {
            Some(InquiryOutcome::Terminated)
        } else if self.complete && self.success {
            Some(InquiryOutcome::Completed)
        } else if self.complete {
            Some(InquiryOutcome::Error)
        } else {
            None
        }
    }
}

impl StackShared {
    pub(crate) fn device_found(&self, record: DeviceRecord) {
        let mut state = self.state.lock();
        let alive = state.alive;
        let inquiry = &mut state.inquiry;
        if !alive || !inquiry.active || inquiry.complete || inquiry.terminated {
            trace!(address = %record.address, "ignoring device response outside of an inquiry");
            return;
        }
        trace!(address = %record.address, name = %record.name, "device responded");
        inquiry.responded.push(record);
        drop(state);
        self.events.notify_all();
    }

    pub(crate) fn inquiry_complete(&self, success: bool, responses: u16) {
        let mut state = self.state.lock();
        if !state.alive || !state.inquiry.active {
            return;
        }
        trace!(success, responses, received = state.inquiry.responded.written(), "inquiry complete");
        state.inquiry.complete = true;
        state.inquiry.success = success;
        drop(state);
        self.events.notify_all();
    }
}

/// One step of a running inquiry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InquiryEvent {
    /// A device responded
    DeviceFound(DeviceRecord),
    /// The inquiry ended. Every later call returns the same outcome.
    Done(InquiryOutcome),
}

impl Stack {
    /// Starts a device inquiry.
    ///
    /// A successful return means the stack has started the inquiry. Responding devices are read from the returned
    /// [`Inquiry`]. Only one inquiry can run at a time, and a new one does not begin until an earlier
    /// [`cancel_inquiry`][Self::cancel_inquiry] has returned from the stack.
    pub fn start_inquiry(&self, access_code: InquiryAccessCode) -> Result<Inquiry> {
        {
            let mut state = self.shared.state.lock();
            while state.alive && state.inquiry.stopping {
                self.shared.events.wait(&mut state);
            }
            if !state.alive {
                return Err(ErrorKind::StackUnavailable.into());
            }
            if state.inquiry.active {
                return Err(ErrorKind::AlreadyInquiring.into());
            }
            state.inquiry.begin();
        }

        debug!(?access_code, "starting inquiry");
        if self.shared.backend.start_inquiry(access_code).is_err() {
            self.shared.state.lock().inquiry.active = false;
            return Err(self.shared.stack_error("failed to start inquiry"));
        }

        Ok(Inquiry {
            stack: self.clone(),
            next_seq: 0,
            outcome: None,
            finished: false,
        })
    }

    /// Cancels the running inquiry.
    ///
    /// The stack is asked to stop and the [`Inquiry`] ends with [`InquiryOutcome::Terminated`] once it has
    /// delivered the responses already received. Does nothing if no inquiry is running.
    pub fn cancel_inquiry(&self) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            if !state.alive {
                return Err(ErrorKind::StackUnavailable.into());
            }
            if !state.inquiry.active || state.inquiry.terminated {
                return Ok(());
            }
            state.inquiry.terminated = true;
            state.inquiry.stopping = true;
        }
        self.shared.events.notify_all();

        debug!("cancelling inquiry");
        self.shared.backend.stop_inquiry();

        self.shared.state.lock().inquiry.stopping = false;
        self.shared.events.notify_all();
        Ok(())
    }
}

/// A running device inquiry.
///
/// Dropping an `Inquiry` before it ends stops the inquiry.
#[derive(Debug)]
pub struct Inquiry {
    stack: Stack,
    next_seq: u64,
    outcome: Option<InquiryOutcome>,
    finished: bool,
}

impl Inquiry {
    /// Blocks until the next device responds or the inquiry ends.
    pub fn next_event(&mut self) -> Result<InquiryEvent> {
        if let Some(outcome) = self.outcome {
            return Ok(InquiryEvent::Done(outcome));
        }
        if self.finished {
            return Err(ErrorKind::StackUnavailable.into());
        }

        let shared = &*self.stack.shared;
        let mut state = shared.state.lock();
        let outcome = loop {
            if !state.alive {
                self.finished = true;
                return Err(Error::with_message(
                    ErrorKind::StackUnavailable,
                    "stack torn down during inquiry",
                ));
            }

            let responded = &state.inquiry.responded;
            if self.next_seq < responded.oldest() {
                debug!(
                    lost = responded.oldest() - self.next_seq,
                    "inquiry responses overwritten before delivery"
                );
                self.next_seq = responded.oldest();
            }
            if let Some(record) = responded.get(self.next_seq) {
                self.next_seq += 1;
                return Ok(InquiryEvent::DeviceFound(record.clone()));
            }

            if let Some(outcome) = state.inquiry.outcome() {
                break outcome;
            }
            shared.events.wait(&mut state);
        };
        drop(state);

        self.finish(Some(outcome));
        Ok(InquiryEvent::Done(outcome))
    }

    /// How the inquiry ended, once it has
    pub fn outcome(&self) -> Option<InquiryOutcome> {
        self.outcome
    }

    fn finish(&mut self, outcome: Option<InquiryOutcome>) {
        self.finished = true;
        self.outcome = outcome;
        let shared = &*self.stack.shared;
        if shared.state.lock().alive {
            shared.backend.stop_inquiry();
        }
        // Only release the inquiry after the stack was told to stop, so a new inquiry is not stopped by accident.
        shared.state.lock().inquiry.active = false;
        debug!(?outcome, "inquiry finished");
    }
}

impl Iterator for Inquiry {
    type Item = Result<DeviceRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_event() {
            Ok(InquiryEvent::DeviceFound(record)) => Some(Ok(record)),
            Ok(InquiryEvent::Done(_)) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

impl Drop for Inquiry {
    fn drop(&mut self) {
        if !self.finished {
            self.finish(None);
        }
    }
}
