//! # MUSES72320 Driver
//!
//! This is a driver for the New Japan Radio MUSES72320 two-channel electronic
//! volume IC.
//!
//! The MUSES72320 is controlled over a write-only SPI bus. Each register write
//! is a two byte transaction: the data byte, followed by an address byte which
//! holds the register select code in the top nibble and the chip address in
//! the bottom three bits. Up to eight chips can therefore share one bus and
//! one chip-select line.
//!
//! The MUSES72320 has the following registers:
//!
//! * Left and Right Attenuation, 0 dB to -111.5 dB in 0.5 dB steps, or mute
//! * Left and Right Gain, 0 dB to +31.5 dB in 0.5 dB steps, plus a +0.25 dB
//!   "fine gain" bit
//! * State, holding the zero-crossing and left/right link settings
//!
//! The [`Muses72320`] object caches the state register because the chip has no
//! way of reading anything back. When attenuation or gain are linked, the chip
//! copies the left channel setting to the right channel itself, so writes to
//! the right channel registers are skipped.
//!
//! # Example
//!
//! You might setup the MUSES72320 like this:
//!
//! ```rust
//! # use embedded_hal_mock::pin::{Mock as PinMock, State as PinState, Transaction as PinTransaction};
//! # use embedded_hal_mock::spi::{Mock as SpiMock, Transaction as SpiTransaction};
//! # let spi = SpiMock::new(&[
//! #     SpiTransaction::write(vec![0b1000_0000, 0b0100_0011]),
//! #     SpiTransaction::write(vec![0x25, 0b0000_0011]),
//! #     SpiTransaction::write(vec![0x40, 0b0001_0011]),
//! #     SpiTransaction::write(vec![0x40, 0b0011_0011]),
//! # ]);
//! # let mut cs_expectations = vec![PinTransaction::set(PinState::High)];
//! # for _ in 0..4 {
//! #     cs_expectations.push(PinTransaction::set(PinState::Low));
//! #     cs_expectations.push(PinTransaction::set(PinState::High));
//! # }
//! # let cs = PinMock::new(&cs_expectations);
//! // `spi` must be configured with `muses72320::MODE`, MSB first, and a clock
//! // no faster than `muses72320::MAX_CLOCK_HZ`.
//! let mut bus = muses72320::SpiBus::new(spi, cs).unwrap();
//! let mut muses = muses72320::Muses72320::new(3);
//! if let Err(e) = muses.set_attenuation_link(&mut bus, true) {
//!     // SPI bus or chip-select pin failed
//! }
//! // -10.25 dB on both channels
//! if let Err(e) = muses.set_volume(&mut bus, -41, -41) {
//!     // SPI bus or chip-select pin failed
//! }
//! # let (mut spi, mut cs) = bus.release();
//! # spi.done();
//! # cs.done();
//! ```

#![no_std]
#![deny(unsafe_code)]
#![deny(missing_docs)]

//
// Public Types
//

/// Errors from the bus underneath the MUSES72320.
///
/// The MUSES72320 itself never reports an error: out-of-range settings are
/// clamped and the bus is write-only.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error<SpiError, PinError> {
    /// The SPI write failed
    Spi(SpiError),
    /// Driving the chip-select pin failed
    Pin(PinError),
}

/// Something that can carry one MUSES72320 register write.
///
/// [`SpiBus`] is the usual implementation. Implement this yourself if your
/// chip-select is handled some other way (e.g. by the SPI peripheral).
pub trait Bus {
    /// The error returned when a transfer fails.
    type Error;

    /// Send `data` then `address`, as one chip-select framed transaction.
    fn transfer(&mut self, data: u8, address: u8) -> Result<(), Self::Error>;
}

/// An SPI bus and a chip-select pin, shared by every MUSES72320 wired to
/// them.
pub struct SpiBus<SPI, CS> {
    spi: SPI,
    cs: CS,
}

/// The contents of an attenuation register and a gain register, as produced
/// by [`encode_volume`].
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ControlData {
    /// Value for the attenuation register
    pub attenuation: u8,
    /// Value for the gain register
    pub gain: u8,
}

/// The settings held in the MUSES72320 state register.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct State {
    /// Delay attenuation changes until the signal crosses zero. Only works if
    /// the ZCEN pin is held low. Defaults to on.
    pub zero_crossing: bool,
    /// The right channel attenuation follows the left. Defaults to off.
    pub link_attenuation: bool,
    /// The right channel gain follows the left. Defaults to off.
    pub link_gain: bool,
}

/// Represents the state inside one MUSES72320 chip.
#[derive(Debug, Clone)]
pub struct Muses72320 {
    chip_address: u8,
    state: State,
}

//
// Private Types
//

/// The set of registers in the MUSES72320
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Register {
    AttenuationLeft = 0b0000,
    GainLeft = 0b0001,
    AttenuationRight = 0b0010,
    GainRight = 0b0011,
    State = 0b0100,
}

//
// Public Data
//

/// The SPI mode the MUSES72320 expects (CPOL = 1, CPHA = 0).
pub const MODE: embedded_hal::spi::Mode = embedded_hal::spi::MODE_2;

/// The SPI clock rate used with the MUSES72320, in Hz.
pub const MAX_CLOCK_HZ: u32 = 250_000;

//
// Private Data
//

const CHIP_ADDRESS_MASK: u8 = 0b0111;

const MIN_ATTENUATION: i16 = -223;
const MIN_VOLUME: i16 = -446;
const MAX_GAIN: i16 = 63;

/// Attenuation register value for 0 dB
const ATTENUATION_ZERO: u8 = 0x10;
/// Attenuation register value for hardware mute
const ATTENUATION_MUTE: u8 = 0x00;
/// Gain register value for 0 dB
const GAIN_ZERO: u8 = 0x00;
/// Gain register value for +0.25 dB
const GAIN_FINE: u8 = 0b0100_0000;

const STATE_BIT_ZERO_CROSSING_OFF: u8 = 1 << 5;
const STATE_BIT_LINK_GAIN: u8 = 1 << 6;
const STATE_BIT_LINK_ATTENUATION: u8 = 1 << 7;

//
// Public Functions
//

/// Convert an attenuation, in 0.5 dB steps, to an attenuation register value.
///
/// * A value of 0 is 0 dB (`0x10`)
/// * A value of -100 is -50 dB (`0x74`)
/// * A value of -223 is -111.5 dB (`0xEF`)
///
/// Values above 0 are treated as 0 and values below -223 as -223.
pub fn encode_attenuation(attenuation: i16) -> u8 {
    let clamped = attenuation.clamp(MIN_ATTENUATION, 0);
    ATTENUATION_ZERO + clamped.unsigned_abs() as u8
}

/// Convert a gain, in 0.5 dB steps, to a gain register value.
///
/// * A value of 0 is 0 dB
/// * A value of 63 is +31.5 dB
///
/// Values are clamped to 0..=63.
pub fn encode_gain(gain: i16) -> u8 {
    gain.clamp(0, MAX_GAIN) as u8
}

/// The gain register value which adds +0.25 dB and nothing else.
pub fn encode_fine_gain() -> u8 {
    GAIN_FINE
}

/// Convert a volume, in 0.25 dB steps, to attenuation and gain register
/// values.
///
/// * A value of 0 is 0 dB
/// * A value of -105 is -26.25 dB
/// * A value of -446 is -111.5 dB
///
/// The chip only attenuates in 0.5 dB steps, so odd volumes attenuate by one
/// step too many and set the +0.25 dB fine gain bit to make up for it. Values
/// are clamped to -446..=0.
pub fn encode_volume(volume: i16) -> ControlData {
    let clamped = volume.clamp(MIN_VOLUME, 0);
    // Truncating division: 0 stays at 0, -1 and -2 both become -1.
    let attenuation = (clamped - 1) / 2;
    ControlData {
        attenuation: encode_attenuation(attenuation),
        gain: if clamped % 2 == 0 { GAIN_ZERO } else { GAIN_FINE },
    }
}

//
// impls on Public Types
//

impl<SPI, CS> SpiBus<SPI, CS>
where
    SPI: embedded_hal::blocking::spi::Write<u8>,
    CS: embedded_hal::digital::v2::OutputPin,
{
    /// Take an SPI bus and a chip-select pin, and de-select the chip.
    ///
    /// The SPI bus must already be set to [`MODE`], MSB first, at no more than
    /// [`MAX_CLOCK_HZ`].
    pub fn new(spi: SPI, mut cs: CS) -> Result<SpiBus<SPI, CS>, CS::Error> {
        cs.set_high()?;
        Ok(SpiBus { spi, cs })
    }

    /// Give back the SPI bus and chip-select pin.
    pub fn release(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }
}

impl<SPI, CS> Bus for SpiBus<SPI, CS>
where
    SPI: embedded_hal::blocking::spi::Write<u8>,
    CS: embedded_hal::digital::v2::OutputPin,
{
    type Error = Error<SPI::Error, CS::Error>;

    fn transfer(&mut self, data: u8, address: u8) -> Result<(), Self::Error> {
        self.cs.set_low().map_err(Error::Pin)?;
        let written = self.spi.write(&[data, address]).map_err(Error::Spi);
        // Always de-select, even if the write failed
        let deselected = self.cs.set_high().map_err(Error::Pin);
        written.and(deselected)
    }
}

impl State {
    /// Pack into the state register layout.
    ///
    /// Bit 7 links attenuation, bit 6 links gain, and bit 5 *disables* zero
    /// crossing. Bits 4 to 0 are unused.
    pub fn to_byte(self) -> u8 {
        let mut byte = 0;
        if !self.zero_crossing {
            byte |= STATE_BIT_ZERO_CROSSING_OFF;
        }
        if self.link_gain {
            byte |= STATE_BIT_LINK_GAIN;
        }
        if self.link_attenuation {
            byte |= STATE_BIT_LINK_ATTENUATION;
        }
        byte
    }
}

impl Default for State {
    fn default() -> State {
        State {
            zero_crossing: true,
            link_attenuation: false,
            link_gain: false,
        }
    }
}

impl Muses72320 {
    /// Create a new MUSES72320 proxy object.
    ///
    /// The `chip_address` is set by the ADR0 to ADR2 pins. Only the bottom
    /// three bits are used.
    ///
    /// Nothing is sent to the chip. The cached state starts at the chip's
    /// power-on defaults (see [`State::default`]).
    pub fn new(chip_address: u8) -> Muses72320 {
        Muses72320 {
            chip_address: chip_address & CHIP_ADDRESS_MASK,
            state: State::default(),
        }
    }

    /// Get the three bit chip address this object talks to.
    pub fn chip_address(&self) -> u8 {
        self.chip_address
    }

    /// Get the cached state register contents.
    pub fn state(&self) -> State {
        self.state
    }

    /// Get whether zero crossing is enabled.
    pub fn is_zero_crossing_enabled(&self) -> bool {
        self.state.zero_crossing
    }

    /// Get whether right channel attenuation follows the left.
    pub fn is_attenuation_linked(&self) -> bool {
        self.state.link_attenuation
    }

    /// Get whether right channel gain follows the left.
    pub fn is_gain_linked(&self) -> bool {
        self.state.link_gain
    }

    /// Set the volume of both channels, in 0.25 dB steps from -446 (-111.5 dB)
    /// to 0 (0 dB).
    ///
    /// See [`encode_volume`]. Writes up to four registers, fewer if the
    /// channels are linked.
    pub fn set_volume<B>(&mut self, bus: &mut B, left: i16, right: i16) -> Result<(), B::Error>
    where
        B: Bus,
    {
        self.set_volume_left(bus, left)?;
        self.set_volume_right(bus, right)
    }

    /// Set both channels to the same volume, in 0.25 dB steps.
    pub fn set_volume_both<B>(&mut self, bus: &mut B, volume: i16) -> Result<(), B::Error>
    where
        B: Bus,
    {
        self.set_volume(bus, volume, volume)
    }

    /// Set the left channel volume, in 0.25 dB steps.
    ///
    /// Overwrites both the left attenuation and the left gain.
    pub fn set_volume_left<B>(&mut self, bus: &mut B, volume: i16) -> Result<(), B::Error>
    where
        B: Bus,
    {
        let data = encode_volume(volume);
        self.write(bus, Register::AttenuationLeft, data.attenuation)?;
        self.write(bus, Register::GainLeft, data.gain)
    }

    /// Set the right channel volume, in 0.25 dB steps.
    ///
    /// Registers linked to the left channel are not written.
    pub fn set_volume_right<B>(&mut self, bus: &mut B, volume: i16) -> Result<(), B::Error>
    where
        B: Bus,
    {
        let data = encode_volume(volume);
        if !self.state.link_attenuation {
            self.write(bus, Register::AttenuationRight, data.attenuation)?;
        }
        if !self.state.link_gain {
            self.write(bus, Register::GainRight, data.gain)?;
        }
        Ok(())
    }

    /// Set the attenuation of both channels, in 0.5 dB steps from -223
    /// (-111.5 dB) to 0 (0 dB).
    ///
    /// The gain registers are left alone.
    pub fn set_attenuation<B>(&mut self, bus: &mut B, left: i16, right: i16) -> Result<(), B::Error>
    where
        B: Bus,
    {
        self.set_attenuation_left(bus, left)?;
        self.set_attenuation_right(bus, right)
    }

    /// Set both channels to the same attenuation, in 0.5 dB steps.
    pub fn set_attenuation_both<B>(&mut self, bus: &mut B, attenuation: i16) -> Result<(), B::Error>
    where
        B: Bus,
    {
        self.set_attenuation(bus, attenuation, attenuation)
    }

    /// Set the left channel attenuation, in 0.5 dB steps.
    pub fn set_attenuation_left<B>(&mut self, bus: &mut B, attenuation: i16) -> Result<(), B::Error>
    where
        B: Bus,
    {
        self.write(bus, Register::AttenuationLeft, encode_attenuation(attenuation))
    }

    /// Set the right channel attenuation, in 0.5 dB steps.
    ///
    /// Does nothing if attenuation is linked.
    pub fn set_attenuation_right<B>(
        &mut self,
        bus: &mut B,
        attenuation: i16,
    ) -> Result<(), B::Error>
    where
        B: Bus,
    {
        if self.state.link_attenuation {
            return Ok(());
        }
        self.write(bus, Register::AttenuationRight, encode_attenuation(attenuation))
    }

    /// Set the gain of both channels, in 0.5 dB steps from 0 (0 dB) to 63
    /// (+31.5 dB).
    pub fn set_gain<B>(&mut self, bus: &mut B, left: i16, right: i16) -> Result<(), B::Error>
    where
        B: Bus,
    {
        self.set_gain_left(bus, left)?;
        self.set_gain_right(bus, right)
    }

    /// Set both channels to the same gain, in 0.5 dB steps.
    pub fn set_gain_both<B>(&mut self, bus: &mut B, gain: i16) -> Result<(), B::Error>
    where
        B: Bus,
    {
        self.set_gain(bus, gain, gain)
    }

    /// Set the left channel gain, in 0.5 dB steps.
    pub fn set_gain_left<B>(&mut self, bus: &mut B, gain: i16) -> Result<(), B::Error>
    where
        B: Bus,
    {
        self.write(bus, Register::GainLeft, encode_gain(gain))
    }

    /// Set the right channel gain, in 0.5 dB steps.
    ///
    /// Does nothing if gain is linked.
    pub fn set_gain_right<B>(&mut self, bus: &mut B, gain: i16) -> Result<(), B::Error>
    where
        B: Bus,
    {
        if self.state.link_gain {
            return Ok(());
        }
        self.write(bus, Register::GainRight, encode_gain(gain))
    }

    /// Set or clear the +0.25 dB fine gain on both channels.
    ///
    /// This replaces whatever gain was set before, so it is only useful
    /// alongside [`Muses72320::set_attenuation`].
    pub fn set_fine_gain<B>(&mut self, bus: &mut B, enabled: bool) -> Result<(), B::Error>
    where
        B: Bus,
    {
        self.set_fine_gain_left(bus, enabled)?;
        self.set_fine_gain_right(bus, enabled)
    }

    /// Set or clear the +0.25 dB fine gain on the left channel.
    pub fn set_fine_gain_left<B>(&mut self, bus: &mut B, enabled: bool) -> Result<(), B::Error>
    where
        B: Bus,
    {
        self.write(bus, Register::GainLeft, fine_gain(enabled))
    }

    /// Set or clear the +0.25 dB fine gain on the right channel.
    ///
    /// Does nothing if gain is linked.
    pub fn set_fine_gain_right<B>(&mut self, bus: &mut B, enabled: bool) -> Result<(), B::Error>
    where
        B: Bus,
    {
        if self.state.link_gain {
            return Ok(());
        }
        self.write(bus, Register::GainRight, fine_gain(enabled))
    }

    /// Mute the left and/or right channel.
    ///
    /// There is no unmute: set the volume or attenuation again instead.
    pub fn mute<B>(&mut self, bus: &mut B, left: bool, right: bool) -> Result<(), B::Error>
    where
        B: Bus,
    {
        if left {
            self.mute_left(bus)?;
        }
        if right {
            self.mute_right(bus)?;
        }
        Ok(())
    }

    /// Mute both channels.
    pub fn mute_both<B>(&mut self, bus: &mut B) -> Result<(), B::Error>
    where
        B: Bus,
    {
        self.mute(bus, true, true)
    }

    /// Mute the left channel.
    pub fn mute_left<B>(&mut self, bus: &mut B) -> Result<(), B::Error>
    where
        B: Bus,
    {
        self.write(bus, Register::AttenuationLeft, ATTENUATION_MUTE)
    }

    /// Mute the right channel.
    ///
    /// Does nothing if attenuation is linked, because muting the left channel
    /// already mutes both.
    pub fn mute_right<B>(&mut self, bus: &mut B) -> Result<(), B::Error>
    where
        B: Bus,
    {
        if self.state.link_attenuation {
            return Ok(());
        }
        self.write(bus, Register::AttenuationRight, ATTENUATION_MUTE)
    }

    /// Enable or disable zero crossing.
    ///
    /// Zero crossing delays attenuation changes until the signal crosses zero,
    /// which avoids clicks. It only works if the ZCEN pin is held low.
    pub fn set_zero_crossing<B>(&mut self, bus: &mut B, enabled: bool) -> Result<(), B::Error>
    where
        B: Bus,
    {
        self.state.zero_crossing = enabled;
        self.write_state(bus)
    }

    /// Enable or disable the attenuation link.
    ///
    /// While linked, the left channel attenuation controls both channels and
    /// right channel attenuation writes are skipped.
    pub fn set_attenuation_link<B>(&mut self, bus: &mut B, enabled: bool) -> Result<(), B::Error>
    where
        B: Bus,
    {
        self.state.link_attenuation = enabled;
        self.write_state(bus)
    }

    /// Enable or disable the gain link.
    ///
    /// While linked, the left channel gain controls both channels and right
    /// channel gain writes are skipped.
    pub fn set_gain_link<B>(&mut self, bus: &mut B, enabled: bool) -> Result<(), B::Error>
    where
        B: Bus,
    {
        self.state.link_gain = enabled;
        self.write_state(bus)
    }

    /// Send the cached state to the state register.
    fn write_state<B>(&mut self, bus: &mut B) -> Result<(), B::Error>
    where
        B: Bus,
    {
        self.write(bus, Register::State, self.state.to_byte())
    }

    /// Write one register on this chip.
    fn write<B>(&self, bus: &mut B, register: Register, data: u8) -> Result<(), B::Error>
    where
        B: Bus,
    {
        let address = register.address_byte(self.chip_address);
        #[cfg(feature = "defmt")]
        defmt::debug!(
            "Setting MUSES72320 {} {:?} to 0x{:02x}",
            self.chip_address,
            register,
            data
        );
        bus.transfer(data, address)
    }
}

//
// impls on Private Types
//

impl Register {
    /// Combine the select code with an already masked chip address into the
    /// second byte of a transfer.
    fn address_byte(self, chip_address: u8) -> u8 {
        ((self as u8) << 4) | chip_address
    }
}

//
// Private Functions
//

fn fine_gain(enabled: bool) -> u8 {
    if enabled {
        encode_fine_gain()
    } else {
        GAIN_ZERO
    }
}

//
// Tests
//


//
// End of file
//
