// Analysis module - signal preparation and feature extraction
//
// Pipeline: normalize (whole recording) -> windows (50% overlap) ->
// features (MFCC matrix per window)

pub mod features;
pub mod normalize;
pub mod windows;
