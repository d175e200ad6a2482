use color_eyre::Result;
use color_eyre::eyre::WrapErr;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AdapterKind {
    Hardware,
    /// CPU implementation of the API, used when no hardware device could be created
    Software,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterInfo {
    pub name: String,
    pub kind: AdapterKind,
}

/// Tries to create a device on a hardware adapter, and retries exactly once on a software
/// adapter if that fails. The error of the software attempt is returned if both fail.
pub fn create_with_fallback<T>(
    mut create: impl FnMut(AdapterKind) -> Result<T>,
) -> Result<(T, AdapterKind)> {
    match create(AdapterKind::Hardware) {
        Ok(device) => Ok((device, AdapterKind::Hardware)),
        Err(hardware_error) => {
            log::warn!(
                "Hardware device creation failed, falling back to a software adapter: {:#}",
                hardware_error
            );
            let device = create(AdapterKind::Software)
                .wrap_err("Software adapter fallback failed as well")?;
            Ok((device, AdapterKind::Software))
        }
    }
}
