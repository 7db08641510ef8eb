use std::fmt;
use std::process::{Command, Stdio};

use tokio::runtime::{Handle, RuntimeFlavor};

use crate::config::ClickConfig;
use crate::{Error, Result};

/// Direction of a wheel click
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScrollDirection {
    Up,
    Down,
}

impl fmt::Display for ScrollDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScrollDirection::Up => write!(f, "up"),
            ScrollDirection::Down => write!(f, "down"),
        }
    }
}

/// Performs discrete wheel clicks against the display
pub trait ClickExecutor: Send {
    fn click(&mut self, direction: ScrollDirection) -> Result<()>;

    /// Issue `count` clicks in one go. Stops at the first failure.
    fn click_n(&mut self, direction: ScrollDirection, count: u32) -> Result<()> {
        for _ in 0..count {
            self.click(direction)?;
        }
        Ok(())
    }
}

/// Run blocking work in place, handing the worker's other tasks off first
/// when called from a multi-thread runtime
fn run_blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

/// Clicks by running an external automation tool, `xdotool` by default
pub struct CommandClicker {
    command: String,
    up_button: u8,
    down_button: u8,
}

impl CommandClicker {
    pub fn new(config: &ClickConfig) -> Self {
        Self {
            command: config.command.clone(),
            up_button: config.up_button,
            down_button: config.down_button,
        }
    }

    fn button(&self, direction: ScrollDirection) -> u8 {
        match direction {
            ScrollDirection::Up => self.up_button,
            ScrollDirection::Down => self.down_button,
        }
    }

    /// `click [--repeat N --delay 0] BUTTON`
    fn args(&self, direction: ScrollDirection, count: u32) -> Vec<String> {
        let mut args = vec!["click".to_string()];
        if count > 1 {
            args.extend([
                "--repeat".to_string(),
                count.to_string(),
                "--delay".to_string(),
                "0".to_string(),
            ]);
        }
        args.push(self.button(direction).to_string());
        args
    }

    fn execute(&self, args: &[String]) -> Result<()> {
        let output = Command::new(&self.command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| Error::Click(format!("Failed to spawn {}: {}", self.command, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Click(format!(
                "{} {} exited with {}: {}",
                self.command,
                args.join(" "),
                output.status,
                stderr.trim()
            )));
        }

        Ok(())
    }
}

impl ClickExecutor for CommandClicker {
    fn click(&mut self, direction: ScrollDirection) -> Result<()> {
        self.click_n(direction, 1)
    }

    /// One process per batch, however many clicks it carries
    fn click_n(&mut self, direction: ScrollDirection, count: u32) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        let args = self.args(direction, count);
        run_blocking(|| self.execute(&args))
    }
}

/// Dry-run executor: logs each click and does nothing else
#[derive(Debug, Default)]
pub struct LogClicker {
    clicks: u64,
}

impl LogClicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clicks(&self) -> u64 {
        self.clicks
    }
}

impl ClickExecutor for LogClicker {
    fn click(&mut self, direction: ScrollDirection) -> Result<()> {
        self.click_n(direction, 1)
    }

    fn click_n(&mut self, direction: ScrollDirection, count: u32) -> Result<()> {
        self.clicks += u64::from(count);
        tracing::info!(%direction, count, total = self.clicks, "wheel click (dry run)");
        Ok(())
    }
}

impl Drop for LogClicker {
    fn drop(&mut self) {
        tracing::info!(total = self.clicks(), "dry run finished");
    }
}

/// Build the executor selected by configuration
pub fn from_config(config: &ClickConfig) -> Box<dyn ClickExecutor> {
    if config.dry_run {
        Box::new(LogClicker::new())
    } else {
        Box::new(CommandClicker::new(config))
    }
}
