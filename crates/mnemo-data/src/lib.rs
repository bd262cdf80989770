//! Measurement tables, subject views and feature matrices for memory-outcome
//! classification
//!
//! This crate turns raw intracranial measurement tables into labeled
//! trial × predictor matrices.
//!
//! # Overview
//!
//! The data flow is:
//!
//! 1. **Load** ([`store::FeatureStore`]): four raw tables (single-channel,
//!    trial × single-channel, channel-pair, trial × channel-pair), read from CSV
//!    files ([`source`]) or assembled in memory ([`table`])
//! 2. **Condition** ([`view::SubjectView`]): restrict to one subject or all,
//!    filter regions, detect and enforce theta channels and phase-encoding
//!    pairs, derive the dominant PAC direction, drop the unused band variant
//! 3. **Project** ([`matrix::FeatureMatrixBuilder`]): aggregate every requested
//!    [`predictor::PredictorId`] per trial into a [`matrix::FeatureMatrix`]
//!    with one outcome label per trial
//!
//! The feature store is never mutated; every view owns its own tables, so
//! views of different subjects or policies can be built concurrently from one
//! store.
//!
//! The [`spectral`] module defines the boundary to the spectral
//! parameterization that produces aperiodic measures upstream.
//!
//! # Example
//!
//! ```
//! use mnemo_data::{
//!     matrix::FeatureMatrixBuilder,
//!     predictor::PredictorSet,
//!     source::read_table_from,
//!     store::FeatureStore,
//!     table::{TableKind, TableSet},
//!     view::{SubjectView, ViewConfig},
//! };
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let channel = "\
//! subject,channel,region,lobe,thetabump
//! R1,LA1,T,T,1
//! R1,LF3,F,F,1
//! ";
//! let trial_channel = "\
//! subject,trial,channel,region,lobe,earlyhfa,encoding
//! R1,0,LA1,T,T,0.9,1
//! R1,0,LF3,F,F,0.1,1
//! R1,1,LA1,T,T,0.2,0
//! R1,1,LF3,F,F,0.3,0
//! ";
//! let pair = "\
//! subject,channelA,regionA,lobeA,channelB,regionB,lobeB,encodingepisodes_cf
//! R1,LA1,T,T,LF3,F,F,2
//! ";
//! let trial_pair = "\
//! subject,trial,channelA,regionA,lobeA,channelB,regionB,lobeB,normtspacAB_cf,normtspacBA_cf
//! R1,0,LA1,T,T,LF3,F,F,0.7,0.2
//! R1,1,LA1,T,T,LF3,F,F,0.1,0.4
//! ";
//!
//! let store = FeatureStore::from_tables(TableSet::new(
//!     read_table_from(TableKind::Channel, channel.as_bytes())?,
//!     read_table_from(TableKind::TrialChannel, trial_channel.as_bytes())?,
//!     read_table_from(TableKind::Pair, pair.as_bytes())?,
//!     read_table_from(TableKind::TrialPair, trial_pair.as_bytes())?,
//! )?);
//!
//! let view = SubjectView::new(&store, ViewConfig::default())?;
//! let predictors: PredictorSet = "earlyhfa@T,normtspacmax@TF".parse()?;
//! let matrix = FeatureMatrixBuilder::new().build(&view, &predictors)?;
//!
//! assert_eq!(matrix.values().dim(), (2, 2));
//! assert_eq!(matrix.labels(), [1, 0]);
//! // trial 1 has its dominant PAC in the F→T direction
//! assert!(matrix.values()[[1, 1]].is_nan());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod matrix;
pub mod nan_as_null;
pub mod predictor;
pub mod source;
pub mod spectral;
pub mod store;
pub mod table;
pub mod view;
