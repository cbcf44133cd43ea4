//! Linux GPIO character-device lines for the physical backend.
//!
//! Claims every line in the [`PinTable`] on one gpiochip and wraps each
//! in a `linux-embedded-hal` [`CdevPin`].  The character-device ABI has no
//! bias flags, so pull-ups on the buttons and pull-downs on the paw rests
//! must be configured in the device tree.

use gpio_cdev::{Chip, LineRequestFlags};
use linux_embedded_hal::CdevPin;
use log::{error, info};

use super::physical::{PhysicalRig, SensorInputs, SpoutOutputs};
use crate::error::{Error, Result};
use crate::pins::PinTable;

/// Consumer label shown by `gpioinfo`.
const CONSUMER: &str = "reach";

/// The Raspberry Pi header lines.
pub const DEFAULT_CHIP: &str = "/dev/gpiochip0";

fn claim(chip: &mut Chip, pin: u8, flags: LineRequestFlags) -> Result<CdevPin> {
    let handle = chip
        .get_line(u32::from(pin))
        .and_then(|line| line.request(flags, 0, CONSUMER))
        .map_err(|e| {
            error!("GPIO {pin}: {e}");
            Error::HardwareInit("could not claim GPIO line")
        })?;
    CdevPin::new(handle).map_err(|e| {
        error!("GPIO {pin}: {e}");
        Error::HardwareInit("could not wrap GPIO line")
    })
}

/// Open `chip_path` and build a physical rig with `spout_count` spouts.
pub fn open_rig(
    chip_path: &str,
    pins: PinTable,
    spout_count: usize,
) -> Result<PhysicalRig<CdevPin, CdevPin>> {
    let mut chip = Chip::new(chip_path).map_err(|e| {
        error!("{chip_path}: {e}");
        Error::HardwareInit("could not open gpiochip")
    })?;

    let input = LineRequestFlags::INPUT;
    let output = LineRequestFlags::OUTPUT;

    let spouts = pins.spouts.iter().take(spout_count);
    let mut touches = Vec::with_capacity(spout_count);
    let mut outputs = Vec::with_capacity(spout_count);
    for s in spouts {
        touches.push(claim(&mut chip, s.touch, input)?);
        outputs.push(SpoutOutputs {
            cue: claim(&mut chip, s.cue, output)?,
            solenoid: claim(&mut chip, s.solenoid, output)?,
        });
    }

    let inputs = SensorInputs {
        paws: [
            claim(&mut chip, pins.paw_sensors[0], input)?,
            claim(&mut chip, pins.paw_sensors[1], input)?,
        ],
        touches,
        buttons: [
            claim(&mut chip, pins.buttons[0], input)?,
            claim(&mut chip, pins.buttons[1], input)?,
        ],
    };

    info!("Claimed rig lines on {chip_path}");
    PhysicalRig::new(pins, inputs, outputs)
}
