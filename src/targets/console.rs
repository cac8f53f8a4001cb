//! Line-oriented console on the CPU channel.

use super::ByteAgent;
use crate::stream::{SendSlot, StreamEndpoint};
use std::collections::VecDeque;

pub const PROMPT: &str = "socscope> ";

/// Output bytes buffered before the console stops accepting input.
const OUTPUT_LIMIT: usize = 256;
const MAX_LINE: usize = 128;

const BACKSPACE: u8 = 0x08;
const DELETE: u8 = 0x7f;

pub struct Console {
    ident: String,
    line: String,
    last_was_cr: bool,
    output: VecDeque<u8>,
    tx_slot: SendSlot<u8>,
    history: Vec<String>,
}

impl Console {
    pub fn new(ident: impl Into<String>) -> Self {
        let mut console = Self {
            ident: ident.into(),
            line: String::new(),
            last_was_cr: false,
            output: VecDeque::new(),
            tx_slot: SendSlot::new(),
            history: Vec::new(),
        };
        console.banner();
        console
    }

    pub fn ident(&self) -> &str {
        &self.ident
    }

    /// Commands executed since reset, oldest first.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Bytes waiting to be transmitted.
    pub fn pending_output(&self) -> usize {
        self.output.len() + usize::from(!self.tx_slot.is_empty())
    }

    fn banner(&mut self) {
        let banner = format!("\r\n{}\r\n{PROMPT}", self.ident);
        self.print(&banner);
    }

    fn print(&mut self, text: &str) {
        self.output.extend(text.as_bytes());
    }

    fn receive(&mut self, byte: u8) {
        match byte {
            b'\n' if self.last_was_cr => {}
            b'\r' | b'\n' => {
                self.print("\r\n");
                let line = std::mem::take(&mut self.line);
                self.execute(line.trim());
                self.print(PROMPT);
            }
            BACKSPACE | DELETE => {
                if self.line.pop().is_some() {
                    self.output.extend([BACKSPACE, b' ', BACKSPACE]);
                }
            }
            0x20..=0x7e if self.line.len() < MAX_LINE => {
                self.line.push(char::from(byte));
                self.output.push_back(byte);
            }
            _ => {}
        }
        self.last_was_cr = byte == b'\r';
    }

    fn execute(&mut self, line: &str) {
        if line.is_empty() {
            return;
        }
        let (command, args) = line.split_once(' ').unwrap_or((line, ""));
        tracing::debug!(command, "console command");
        match command {
            "help" => self.print("help   - this text\r\nident  - SoC identifier\r\necho   - print arguments\r\n"),
            "ident" => {
                let ident = format!("{}\r\n", self.ident);
                self.print(&ident);
            }
            "echo" => {
                let text = format!("{}\r\n", args.trim());
                self.print(&text);
            }
            other => {
                let text = format!("unknown command: {other}\r\n");
                self.print(&text);
            }
        }
        self.history.push(line.to_string());
    }
}

impl ByteAgent for Console {
    fn name(&self) -> &str {
        "console"
    }

    fn publish_ready(&mut self, rx: &mut StreamEndpoint<u8>) {
        rx.set_ready(self.output.len() < OUTPUT_LIMIT);
    }

    fn produce(&mut self, tx: &mut StreamEndpoint<u8>) {
        if self.tx_slot.is_empty() {
            if let Some(byte) = self.output.pop_front() {
                self.tx_slot.load(byte);
            }
        }
        self.tx_slot.drive(tx);
    }

    fn consume(&mut self, rx: &mut StreamEndpoint<u8>) {
        if let Some(byte) = rx.take() {
            self.receive(byte);
        }
    }

    fn reset(&mut self) {
        self.line.clear();
        self.last_was_cr = false;
        self.output.clear();
        self.tx_slot.clear();
        self.history.clear();
        self.banner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feed `input` and run until the console has nothing left to say.
    fn run(console: &mut Console, input: &[u8]) -> String {
        let mut rx = StreamEndpoint::new("cpu.rx");
        let mut tx = StreamEndpoint::new("cpu.tx");
        let mut input = input.iter().copied();
        let mut out = Vec::new();
        for _ in 0..4096 {
            console.publish_ready(&mut rx);
            tx.set_ready(true);
            if rx.is_ready() {
                if let Some(b) = input.next() {
                    rx.try_send(b).unwrap();
                }
            }
            console.produce(&mut tx);
            console.consume(&mut rx);
            out.extend(tx.take());
            rx.tick();
            tx.tick();
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_banner_and_echo() {
        let mut console = Console::new("test soc");
        let out = run(&mut console, b"echo hi\r\n");
        assert!(out.starts_with("\r\ntest soc\r\nsocscope> "));
        assert!(out.contains("echo hi\r\nhi\r\nsocscope> "));
        assert_eq!(console.history(), ["echo hi"]);
    }

    #[test]
    fn test_crlf_is_one_line_end() {
        let mut console = Console::new("x");
        let out = run(&mut console, b"\r\n");
        assert_eq!(out.matches(PROMPT).count(), 2);
    }

    #[test]
    fn test_backspace_and_unknown() {
        let mut console = Console::new("x");
        let out = run(&mut console, b"idx\x08ent\rfoo\r");
        assert!(out.contains("\x08 \x08"));
        assert!(out.contains("idx\x08 \x08ent\r\nx\r\n"));
        assert!(out.contains("unknown command: foo"));
        assert_eq!(console.history(), ["ident", "foo"]);
    }

    #[test]
    fn test_reset_restores_banner() {
        let mut console = Console::new("x");
        run(&mut console, b"help\r");
        console.reset();
        assert!(console.history().is_empty());
        assert_eq!(console.pending_output(), "\r\nx\r\nsocscope> ".len());
    }
}
