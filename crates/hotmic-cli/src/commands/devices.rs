//! `hotmic devices` - list audio devices.

use super::CommandError;

pub fn run() -> Result<(), CommandError> {
    let devices = hotmic_io::list_devices()?;
    if devices.is_empty() {
        println!("no audio devices found");
        return Ok(());
    }

    let (default_in, default_out) = hotmic_io::default_devices()?;
    println!("{:<40} {:>6} {:>7} {:>10}", "Device", "Input", "Output", "Rate");
    for device in devices {
        let mut name = device.name.clone();
        if default_in.as_ref().is_some_and(|d| d.name == device.name)
            || default_out.as_ref().is_some_and(|d| d.name == device.name)
        {
            name.push_str(" (default)");
        }
        println!(
            "{:<40} {:>6} {:>7} {:>10}",
            name,
            if device.is_input { "yes" } else { "-" },
            if device.is_output { "yes" } else { "-" },
            device.default_sample_rate,
        );
    }
    Ok(())
}
