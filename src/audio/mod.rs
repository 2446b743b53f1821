pub mod codec;
pub mod output;
pub mod resample;
pub mod source;

#[cfg(feature = "cpal-audio")]
pub mod capture;
#[cfg(feature = "cpal-audio")]
pub mod playback;
