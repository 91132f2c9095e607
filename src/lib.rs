pub mod batch;
pub mod config;
pub mod error;
pub mod genome;
pub mod gff3;
pub mod hgvs;
pub mod mapper;
pub mod normalize;
pub mod refgene;
pub mod structures;
pub mod table;
pub mod transcript_builder;
