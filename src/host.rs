//! Host I/O used by the `print` and `input` forms.

use std::{
    cell::RefCell,
    collections::VecDeque,
    io::{self, BufRead, Write},
    rc::Rc,
};

pub trait Host {
    fn print(&mut self, line: &str) -> io::Result<()>;

    /// Read one line; `None` at end of input.
    fn input(&mut self, prompt: Option<&str>) -> io::Result<Option<String>>;
}

/// Process stdout/stdin.
#[derive(Debug, Default)]
pub struct StdHost;

impl Host for StdHost {
    fn print(&mut self, line: &str) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{line}")?;
        stdout.flush()
    }

    fn input(&mut self, prompt: Option<&str>) -> io::Result<Option<String>> {
        if let Some(prompt) = prompt {
            let mut stdout = io::stdout().lock();
            write!(stdout, "{prompt}")?;
            stdout.flush()?;
        }
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }
}

/// In-memory host for embedders and tests. Clones share the same buffers.
#[derive(Debug, Clone, Default)]
pub struct BufferedHost {
    output: Rc<RefCell<Vec<String>>>,
    input: Rc<RefCell<VecDeque<String>>>,
}

impl BufferedHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let host = Self::new();
        host.input
            .borrow_mut()
            .extend(lines.into_iter().map(Into::into));
        host
    }

    /// Every line printed so far.
    pub fn lines(&self) -> Vec<String> {
        self.output.borrow().clone()
    }

    pub fn output(&self) -> String {
        self.output
            .borrow()
            .iter()
            .map(|line| format!("{line}\n"))
            .collect()
    }
}

impl Host for BufferedHost {
    fn print(&mut self, line: &str) -> io::Result<()> {
        self.output.borrow_mut().push(line.to_string());
        Ok(())
    }

    fn input(&mut self, _prompt: Option<&str>) -> io::Result<Option<String>> {
        Ok(self.input.borrow_mut().pop_front())
    }
}
