// Module declarations
pub mod ancestry;
pub mod groups;
pub mod matrix;
pub mod output;
pub mod parse;
pub mod pca;
pub mod process;
pub mod progress;
pub mod stats;

#[cfg(test)]
mod tests;
