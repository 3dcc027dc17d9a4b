//! Global constants for feb operations
//!
//! The register sizes are fixed by the CITIROC
//! ASIC on the boards, the histogram sizes by
//! its 12 bit ADC.

/// Number of channels (SiPMs) on a single feb
pub const NCHN           : usize = 32;

/// Number of channel pairs. Triggers are 
/// enabled per pair during a pedestal/gain sweep
pub const NPAIRS         : usize = NCHN/2;

/// Number of histogram bins per channel (12 bit ADC)
pub const NBINS          : usize = 4096;

/// Length of the slow control register in bits
pub const SC_BIT_LEN     : usize = 1144;
/// Length of the packed slow control register
pub const SC_BYTE_LEN    : usize = 143;
/// Length of the slow control register as hex string
pub const SC_HEX_LEN     : usize = 286;

/// Length of the power amplifier (PM) register in bits
pub const PM_BIT_LEN     : usize = 224;
/// Length of the packed power amplifier register
pub const PM_BYTE_LEN    : usize = 28;
/// Length of the power amplifier register as hex string
pub const PM_HEX_LEN     : usize = 56;

/// Start of the 8bit input DAC field for channel 0.
/// Every channel has 9 bits (8 bit DAC + enable)
pub const DAC_OFFSET     : usize = 331;
pub const DAC_STRIDE     : usize = 9;
pub const DAC_BITS       : usize = 8;

/// Position of the trigger disable bit for channel 0.
/// Every channel has 15 bits in this section
pub const TRIGGER_OFFSET : usize = 633;
pub const TRIGGER_STRIDE : usize = 15;

/// 10bit DAC for the time discriminator threshold
pub const TIME_THRESHOLD_OFFSET   : usize = 1107;
/// 10bit DAC for the charge discriminator threshold
pub const CHARGE_THRESHOLD_OFFSET : usize = 1117;
pub const THRESHOLD_BITS          : usize = 10;

/// Size of a single event record in bytes
/// (2+2+4+4+32*2)
pub const EVENT_RECORD_LEN : usize = 76;

/// The driver marks the last event of a buffer
/// by writing this into the second timestamp
pub const MAGIC_WORD32     : u32 = 0x01020255;

/// Board id which addresses all boards at once
pub const BROADCAST_ID     : u8 = 255;

/// Length of the driver's acknowledgement
pub const ACK_LEN          : usize = 3;

/// Size of a serialized histogram set
pub const HISTOGRAM_SET_LEN : usize = 1 + SC_BYTE_LEN + NCHN*NBINS*4 + NCHN*NBINS*2;

/// Comment delimiter in text configuration files
pub const CONFIG_COMMENT   : char = '\'';
