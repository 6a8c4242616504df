pub mod actor;
pub mod engine;
pub mod memory;
pub mod policy;

#[cfg(test)]
pub(crate) mod test_support;
