//! File formats at the edges of the simulator.

pub mod output_writer;
pub mod text;
pub mod vcf_processing;
