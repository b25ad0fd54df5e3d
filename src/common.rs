pub(crate) mod concurrent;
pub(crate) mod error;
pub(crate) mod time;

#[cfg(test)]
pub(crate) mod test_utils;
