// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Leveled event reporting.
//!
//! Core logic never writes to the terminal itself. It hands leveled events to
//! a [`Report`] implementation instead, which lets the binary forward them to
//! `tracing` while tests simply collect them.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    sync::Mutex,
};

/// Severity of reported event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
}

/// Single reported event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub level: Level,
    pub message: String,
}

impl Display for Event {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(&self.message)
    }
}

/// Sink for leveled events.
pub trait Report: Send + Sync {
    /// Receive one event.
    fn report(&self, event: Event);

    fn debug(&self, message: impl Into<String>)
    where
        Self: Sized,
    {
        self.report(Event {
            level: Level::Debug,
            message: message.into(),
        });
    }

    fn info(&self, message: impl Into<String>)
    where
        Self: Sized,
    {
        self.report(Event {
            level: Level::Info,
            message: message.into(),
        });
    }

    fn warn(&self, message: impl Into<String>)
    where
        Self: Sized,
    {
        self.report(Event {
            level: Level::Warn,
            message: message.into(),
        });
    }
}

/// Forward events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReport;

impl Report for TracingReport {
    fn report(&self, event: Event) {
        match event.level {
            Level::Debug => tracing::debug!("{}", event.message),
            Level::Info => tracing::info!("{}", event.message),
            Level::Warn => tracing::warn!("{}", event.message),
        }
    }
}

/// Collect events in memory.
#[derive(Debug, Default)]
pub struct CollectReport {
    events: Mutex<Vec<Event>>,
}

impl CollectReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain every collected event.
    pub fn take(&self) -> Vec<Event> {
        match self.events.lock() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    /// Messages of collected events at `level`, without draining.
    pub fn messages(&self, level: Level) -> Vec<String> {
        let events = match self.events.lock() {
            Ok(events) => events,
            Err(poisoned) => poisoned.into_inner(),
        };

        events
            .iter()
            .filter(|event| event.level == level)
            .map(|event| event.message.clone())
            .collect()
    }
}

impl Report for CollectReport {
    fn report(&self, event: Event) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

impl<R: Report> Report for &R {
    fn report(&self, event: Event) {
        (**self).report(event)
    }
}
