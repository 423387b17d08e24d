use crate::platform::StatusSink;

/// How long a notice stays on screen.
pub const NOTICE_TIMEOUT_MS: u32 = 2_000;

const NOTICE_MAX_LEN: usize = 39;
// Short messages are padded so they fully overwrite a longer predecessor.
const NOTICE_MIN_LEN: usize = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeUpdate {
    /// Nothing posted.
    Idle,
    /// The notice timed out on this poll; clear the status area once.
    Expired,
    /// The notice is visible. `redraw` is set when the text changed since
    /// the previous poll and the status area should be cleared first.
    Visible { redraw: bool },
}

/// Transient on-screen message with a fixed timeout.
#[derive(Debug, Default)]
pub struct NoticeBoard {
    text: String,
    posted_ms: Option<u32>,
    checksum: Option<u32>,
}

impl NoticeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post(&mut self, now_ms: u32, msg: &str) {
        let mut end = msg.len().min(NOTICE_MAX_LEN);
        while !msg.is_char_boundary(end) {
            end -= 1;
        }
        self.text.clear();
        self.text.push_str(&msg[..end]);
        while self.text.len() < NOTICE_MIN_LEN {
            self.text.push(' ');
        }
        self.posted_ms = Some(now_ms);
    }

    pub fn poll(&mut self, now_ms: u32) -> NoticeUpdate {
        let Some(posted) = self.posted_ms else {
            return NoticeUpdate::Idle;
        };

        if now_ms.wrapping_sub(posted) > NOTICE_TIMEOUT_MS {
            self.posted_ms = None;
            self.text.clear();
            return NoticeUpdate::Expired;
        }

        let sum = self.text.bytes().take(3).map(u32::from).sum();
        let redraw = self.checksum != Some(sum);
        self.checksum = Some(sum);
        NoticeUpdate::Visible { redraw }
    }

    pub fn text(&self) -> Option<&str> {
        self.posted_ms.map(|_| self.text.as_str())
    }
}

/// [`StatusSink`] that posts onto a [`NoticeBoard`] at a fixed time.
pub struct Notifier<'a> {
    board: &'a mut NoticeBoard,
    now_ms: u32,
}

impl<'a> Notifier<'a> {
    pub fn new(board: &'a mut NoticeBoard, now_ms: u32) -> Self {
        Self { board, now_ms }
    }
}

impl StatusSink for Notifier<'_> {
    fn status(&mut self, msg: &str) {
        self.board.post(self.now_ms, msg);
    }
}
