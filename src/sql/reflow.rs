//! Reflow engine
//!
//! Works on the flat stream of raw segments under a parsed tree rather than
//! the tree itself. The stream is cut into alternating elements:
//!
//! - **Blocks** hold one code (or comment, placeholder, end-of-file) segment
//!   and remember where it sits in the tree ([`DepthInfo`]).
//! - **Points** hold the whitespace, newlines and indent metas between two
//!   blocks. All layout decisions are made at points.
//!
//! The reindent pass walks the points, works out the indent balance each
//! line should open with, and returns [`LintFix`](crate::sql::segments::LintFix)es
//! that bring the actual whitespace in line with it. Respace sets the spacing
//! between blocks on a line from the `[layout]` config, and rebreak moves
//! operators and commas to their preferred side of a line break. Fixes are
//! applied to the tree with [`apply_fixes`](crate::sql::segments::apply_fixes).

pub mod config;
pub mod depth_map;
pub mod elements;
pub mod reindent;
pub mod respace;
pub mod sequence;

pub use config::{BlockConfig, LayoutRule, LinePosition, ReflowConfig, Spacing, SpacingRule};
pub use depth_map::{DepthInfo, DepthMap, StackPosition, StackPositionType};
pub use elements::{IndentStats, ReflowBlock, ReflowElement, ReflowPoint};
pub use reindent::{construct_single_indent, lint_indent_points, IndentPolicy};
pub use respace::InsertAnchor;
pub use sequence::{InsertPosition, ReflowSequence, RespaceFilter, TargetSides};
