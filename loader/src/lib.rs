//! External inputs for confgraph: configuration files, schema declaration
//! files and command-line overrides.
//!
//! Everything here produces plain values for `confgraph-core`:
//!
//! - [`SourceLoader`] reads YAML / JSON / TOML files (with `config:`
//!   includes) into ranked [`RawTree`](confgraph_core::RawTree)s.
//! - [`load_declarations`] reads schema declarations.
//! - [`parse_overrides`] turns `--Schema.field=value` arguments into the
//!   highest-precedence tree.
//!
//! Failures are [`LoadError`]s, which convert into
//! [`ResolutionError::SourceLoad`](confgraph_core::ResolutionError::SourceLoad)
//! when reported alongside engine errors.
//!
//! # Quick start
//!
//! ```no_run
//! use confgraph_core::Resolver;
//! use confgraph_loader::{SourceLoader, load_declarations, parse_overrides};
//!
//! let decls = load_declarations("schemas.yaml").unwrap();
//! let sources = SourceLoader::new().load_all(&["tutorial.yaml"]).unwrap();
//! let overrides = parse_overrides(["--OptimizerConfig.lr=0.05"]).unwrap();
//!
//! let graph = Resolver::new()
//!     .with_declarations(decls)
//!     .with_sources(sources)
//!     .with_overrides(overrides)
//!     .resolve()
//!     .unwrap();
//! println!("{}", graph.fingerprint());
//! ```

mod declarations;
mod error;
mod loader;
mod overrides;

pub use declarations::{load_all_declarations, load_declarations, parse_declarations};
pub use error::{LoadError, Result};
pub use loader::{INCLUDE_KEY, SourceFormat, SourceLoader};
pub use overrides::parse_overrides;
