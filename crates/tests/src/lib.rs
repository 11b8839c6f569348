#[cfg(test)]
mod fixtures;

#[cfg(test)]
mod display_tests;
#[cfg(test)]
mod session_tests;
#[cfg(test)]
mod subscription_speech_tests;
