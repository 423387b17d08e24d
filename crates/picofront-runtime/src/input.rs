use bitflags::bitflags;

bitflags! {
    /// Pad state as reported by the input source. The low 12 bits are the
    /// pad itself; the turbo bits map onto B, C and A.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PadButtons: u16 {
        const UP = 0x0001;
        const DOWN = 0x0002;
        const LEFT = 0x0004;
        const RIGHT = 0x0008;
        const B = 0x0010;
        const C = 0x0020;
        const A = 0x0040;
        const START = 0x0080;
        const Z = 0x0100;
        const Y = 0x0200;
        const X = 0x0400;
        const MODE = 0x0800;
        const TURBO_B = 0x1000;
        const TURBO_C = 0x2000;
        const TURBO_A = 0x4000;
    }
}

impl PadButtons {
    pub const PAD_MASK: Self = Self::from_bits_retain(0x0fff);
    pub const TURBO_MASK: Self = Self::from_bits_retain(0x7000);
}

bitflags! {
    /// Emulator-level events bound to keys.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EmuEvents: u32 {
        const STATE_SAVE = 1 << 0;
        const STATE_LOAD = 1 << 1;
        const SLOT_PREV = 1 << 2;
        const SLOT_NEXT = 1 << 3;
        const SWITCH_RENDERER = 1 << 4;
        const VOL_DOWN = 1 << 5;
        const VOL_UP = 1 << 6;
        const FAST_FORWARD = 1 << 7;
        const MENU = 1 << 8;
        const RESET = 1 << 9;
        /// Cycle the Pico input mode: joystick, pen on storyware, pen on pad.
        const PICO_SWINP = 1 << 10;
        const PICO_PPREV = 1 << 11;
        const PICO_PNEXT = 1 << 12;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MenuKeys: u8 {
        const CONFIRM = 1 << 0;
        const BACK = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputFrame {
    pub pads: [PadButtons; 2],
    pub events: EmuEvents,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeStep {
    Up,
    Down,
}

/// Result of sampling one frame of input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SampledInput {
    /// Pad state for the core, turbo applied.
    pub pads: [PadButtons; 2],
    /// Held every frame the volume keys are down.
    pub volume: Option<VolumeStep>,
    /// New fast-forward level when it changed this frame.
    pub fast_forward: Option<bool>,
    /// Events newly pressed this frame, volume and fast-forward excluded.
    pub pressed: EmuEvents,
}

const TURBO_TOGGLE_AT: u8 = 60;
const TURBO_BITS: [(PadButtons, PadButtons); 3] = [
    (PadButtons::TURBO_B, PadButtons::B),
    (PadButtons::TURBO_C, PadButtons::C),
    (PadButtons::TURBO_A, PadButtons::A),
];

#[derive(Debug, Clone, Copy, Default)]
struct Turbo {
    counters: [u8; 3],
    toggled: PadButtons,
}

impl Turbo {
    fn apply(&mut self, raw: PadButtons, rate: u8) -> PadButtons {
        let mut pad = raw & PadButtons::PAD_MASK;
        if !raw.intersects(PadButtons::TURBO_MASK) {
            return pad;
        }

        let inc = rate.saturating_mul(2);
        for (i, (turbo, button)) in TURBO_BITS.iter().enumerate() {
            if !raw.contains(*turbo) {
                continue;
            }
            self.counters[i] = self.counters[i].saturating_add(inc);
            if self.counters[i] >= TURBO_TOGGLE_AT {
                self.toggled.toggle(*button);
                self.counters[i] = 0;
            }
            if self.toggled.contains(*button) {
                pad |= *button;
            }
        }
        pad
    }
}

/// Turns raw per-frame input into pad state and event edges.
#[derive(Debug, Clone, Default)]
pub struct InputSampler {
    prev_events: EmuEvents,
    turbo: [Turbo; 2],
    turbo_rate: u8,
}

impl InputSampler {
    pub fn new(turbo_rate: u8) -> Self {
        Self {
            turbo_rate,
            ..Self::default()
        }
    }

    pub fn set_turbo_rate(&mut self, rate: u8) {
        self.turbo_rate = rate;
    }

    pub fn sample(&mut self, frame: InputFrame) -> SampledInput {
        let pads = [
            self.turbo[0].apply(frame.pads[0], self.turbo_rate),
            self.turbo[1].apply(frame.pads[1], self.turbo_rate),
        ];

        let events = frame.events;
        let volume = if events.contains(EmuEvents::VOL_UP) {
            Some(VolumeStep::Up)
        } else if events.contains(EmuEvents::VOL_DOWN) {
            Some(VolumeStep::Down)
        } else {
            None
        };

        let fast_forward = ((events ^ self.prev_events).contains(EmuEvents::FAST_FORWARD))
            .then(|| events.contains(EmuEvents::FAST_FORWARD));

        let pressed = (events & !self.prev_events)
            - (EmuEvents::VOL_UP | EmuEvents::VOL_DOWN | EmuEvents::FAST_FORWARD);
        self.prev_events = events;

        SampledInput {
            pads,
            volume,
            fast_forward,
            pressed,
        }
    }
}

pub(crate) const CONFIRM_POLL_MS: u32 = 50;

/// Confirmation dialog: waits for the confirm/back keys to be released, then
/// pressed, then released again, polling every 50 ms. Returns `true` on
/// confirm. `give_up` is checked between polls and counts as "no".
pub fn wait_confirm(
    input: &mut dyn crate::platform::InputSource,
    mut give_up: impl FnMut() -> bool,
) -> bool {
    let keys = MenuKeys::CONFIRM | MenuKeys::BACK;

    while input.menu_keys(CONFIRM_POLL_MS).intersects(keys) {
        if give_up() {
            return false;
        }
    }

    let pressed = loop {
        let held = input.menu_keys(CONFIRM_POLL_MS);
        if held.intersects(keys) {
            break held;
        }
        if give_up() {
            return false;
        }
    };

    while input.menu_keys(CONFIRM_POLL_MS).intersects(keys) {
        if give_up() {
            break;
        }
    }

    !pressed.contains(MenuKeys::BACK)
}
