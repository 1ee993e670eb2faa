pub mod attendance;
pub mod fees;
pub mod validate;

#[cfg(test)]
pub mod testing;
