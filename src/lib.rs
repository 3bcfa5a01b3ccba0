//! The library code for the `daybook` scheduled publisher. Each run publishes
//! exactly one post and can be broken down into two distinct steps:
//!
//! 1. Producing a draft ([`crate::topic`], [`crate::provider`]), falling back
//!    to a placeholder ([`crate::draft`]) when generation fails
//! 2. Writing the post and merging it into the derived artifacts
//!    ([`crate::publish`])
//!
//! The second step is the more involved. The post itself is rendered from a
//! fixed layout ([`crate::render`]) under a slug that no existing post uses
//! ([`crate::slugs`]). Then each derived artifact gets the smallest edit that
//! includes the new post:
//!
//! 1. The listing page gets one entry prepended ([`crate::index`])
//! 2. The sitemap gets one entry inserted or refreshed ([`crate::sitemap`])
//! 3. The homepage's latest-posts region is regenerated ([`crate::homepage`])
//! 4. The run log records the slug under today's date ([`crate::runlog`])
//!
//! Only the managed region of each document is touched. Every other byte of
//! the listing page and homepage is preserved.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod config;
pub mod date;
pub mod draft;
pub mod homepage;
pub mod index;
pub mod markup;
pub mod post;
pub mod provider;
pub mod publish;
pub mod render;
pub mod runlog;
pub mod sitemap;
pub mod slugs;
pub mod topic;
pub mod util;
