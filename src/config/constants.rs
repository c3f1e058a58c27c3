// src/config/constants.rs
//! System-wide configuration constants

/// Signal and channel constants
pub mod signal {
    /// Number of physiological channels carried by one frame
    pub const CHANNEL_COUNT: usize = 4;
    pub const DEFAULT_SAMPLING_RATE_HZ: u32 = 256;
    pub const DEFAULT_HISTORY_LENGTH: usize = 4096;
    /// Largest value a 10-bit ADC reading can take
    pub const ADC_MAX: u16 = 1023;
    /// Angular step of the sine used to pre-seed channel histories
    pub const SEED_WAVE_STEP: f64 = 0.1;
}

/// Wire protocol constants
pub mod protocol {
    pub const HEADER_BYTE: u8 = 0xCC;
    pub const HEADER_LEN: usize = 2;
    /// counter, sequence, four low bytes, packed high bits
    pub const PAYLOAD_LEN: usize = 7;
    pub const FRAME_LEN: usize = HEADER_LEN + PAYLOAD_LEN;
    /// Packet index of the first channel low byte
    pub const FIRST_PACKET_INDEX: u8 = 2;
    pub const LAST_PACKET_INDEX: u8 = 5;
    /// Offset of the packed high-bit byte inside the payload
    pub const PACKED_HIGH_BITS_OFFSET: usize = 6;
    /// (mask, shift) pairs rebuilding bits 8..9 of each sample
    pub const HIGH_BIT_LAYOUT: [(u8, u32); 4] = [(0x03, 8), (0x0C, 6), (0x30, 4), (0xC0, 2)];
    pub const SEQUENCE_MODULUS: u16 = 256;
}

/// Notch filter constants
pub mod filters {
    pub const DEFAULT_MAINS_FREQ_HZ: f64 = 50.0;
    pub const DEFAULT_NOTCH_HALF_WIDTH_HZ: f64 = 0.5;
    pub const DEFAULT_FILTER_ORDER: usize = 3;
    pub const DEFAULT_SECOND_NOTCH_MULTIPLIER: f64 = 2.0;
    pub const MIN_FILTER_ORDER: usize = 1;
    /// Above this the combined 4*order-pole design either has poles outside
    /// the unit circle or start-up transients orders of magnitude above
    /// full scale
    pub const MAX_FILTER_ORDER: usize = 3;
    /// Number of cascaded bandstop sections
    pub const NOTCH_SECTIONS: usize = 2;

    /// Coefficient count after convolving both sections of the given order
    pub const fn filter_length(order: usize) -> usize {
        NOTCH_SECTIONS * 2 * order + 1
    }
}

/// Spectrum snapshot constants
pub mod spectrum {
    pub const DEFAULT_INTERVAL_DIVISOR: u32 = 32;
    pub const DEFAULT_WINDOW_LENGTH: usize = 256;
}

/// Serial link constants
pub mod hal {
    pub const DEFAULT_PORT_NAME: &str = "/dev/ttyUSB0";
    pub const DEFAULT_BAUD_RATE: u32 = 115_200;
    pub const DEFAULT_READ_TIMEOUT_MS: u64 = 50;
    pub const READ_CHUNK_SIZE: usize = 64;
}

/// Timing constants for the acquisition and display tasks
pub mod timing {
    pub const IDLE_DRAIN_INTERVAL_MS: u64 = 500;
    pub const DISPLAY_REFRESH_INTERVAL_MS: u64 = 50;
    /// How often an idle worker re-checks its termination flag
    pub const WORKER_POLL_INTERVAL_MS: u64 = 100;
    pub const DEFAULT_WORKER_QUEUE_DEPTH: usize = 64;
}

/// Threshold detection constants
pub mod detection {
    pub const DEFAULT_WINDOW_SAMPLES: usize = 64;
    pub const DEFAULT_THRESHOLD: f64 = 100.0;
}

/// Calibration pattern constants
pub mod calibration {
    pub const DEFAULT_REPEATS: u32 = 5;
    pub const DEFAULT_INTERVALS_SECS: [f64; 2] = [1.0, 2.0];
}
