//! Core processing modules

pub mod reproject;
pub mod intersect;
pub mod split;
pub mod region;
pub mod timeseries;
pub mod displacement;

// Re-export main types
pub use reproject::{reproject, Reprojector};
pub use intersect::{find_intersections, Crossing};
pub use split::{points_at_distances, split_line, SamplePoint, SamplePoints};
pub use region::{RegionSample, RegionSampler, RegionShape, SampleRegion, SamplerConfig, QualityMask};
pub use timeseries::{
    discover_products, parse_acquisition_dates, FailurePolicy, ProductGap, TimeSeries,
    TimeSeriesConfig, TimeSeriesDriver, TimeSeriesRecord,
};
pub use displacement::{mask_displacement, DisplacementMasker, MaskedDisplacement};
