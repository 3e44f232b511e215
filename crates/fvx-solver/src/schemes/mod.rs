//! Discretisation schemes.
//!
//! Each category has a run-time selection table from scheme name to a
//! constructor that consumes the rest of the specification string, so
//! `Gauss limitedLinear 1` builds a Gauss convection scheme around a
//! limited-linear interpolation. Resolved schemes are plain enums.

mod convection;
mod d2dt2;
mod ddt;
mod grad;
mod interpolation;
mod laplacian;
mod sn_grad;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use fvx_dict::TokenStream;
use fvx_io::SchemeCategory;
use log::debug;

use crate::error::Result;

pub use convection::{ConvectionScheme, convection_schemes};
pub use d2dt2::{D2dt2Scheme, d2dt2_schemes};
pub use ddt::{Ddt0State, DdtScheme, ddt_schemes};
pub use grad::{GradScheme, grad_schemes};
pub use interpolation::{InterpolationScheme, Limiter, gradient_ratio, interpolation_schemes};
pub use laplacian::{LaplacianScheme, laplacian_schemes};
pub use sn_grad::{SnGradScheme, sn_grad_schemes};

/// Parses a complete specification string; trailing tokens are an error.
pub(crate) fn parse_spec<S>(spec: &str, from_tokens: fn(&mut TokenStream) -> Result<S>) -> Result<S> {
    let mut tokens = TokenStream::parse_str(spec)?;
    let scheme = from_tokens(&mut tokens)?;
    tokens.expect_end()?;
    Ok(scheme)
}

/// Registered names of every scheme category, for listing.
pub fn registered() -> Vec<(&'static str, Vec<&'static str>)> {
    vec![
        (
            SchemeCategory::Interpolation.dictionary_name(),
            interpolation_schemes().names(),
        ),
        (SchemeCategory::SnGrad.dictionary_name(), sn_grad_schemes().names()),
        (SchemeCategory::Grad.dictionary_name(), grad_schemes().names()),
        (SchemeCategory::Ddt.dictionary_name(), ddt_schemes().names()),
        (SchemeCategory::D2dt2.dictionary_name(), d2dt2_schemes().names()),
        (SchemeCategory::Div.dictionary_name(), convection_schemes().names()),
        (
            SchemeCategory::Laplacian.dictionary_name(),
            laplacian_schemes().names(),
        ),
    ]
}

/// Schemes of one category resolved for one mesh generation.
#[derive(Debug)]
pub struct SchemeCache<S> {
    category: SchemeCategory,
    generation: Cell<Option<u64>>,
    entries: RefCell<HashMap<String, S>>,
}

impl<S: Clone> SchemeCache<S> {
    pub fn new(category: SchemeCategory) -> Self {
        Self {
            category,
            generation: Cell::new(None),
            entries: RefCell::new(HashMap::new()),
        }
    }

    pub fn resolve(&self, generation: u64, spec: &str, build: fn(&str) -> Result<S>) -> Result<S> {
        if self.generation.get() != Some(generation) {
            let mut entries = self.entries.borrow_mut();
            if !entries.is_empty() {
                debug!(
                    "Dropping {} cached {} for mesh generation {generation}",
                    entries.len(),
                    self.category.dictionary_name()
                );
                entries.clear();
            }
            self.generation.set(Some(generation));
        }
        if let Some(scheme) = self.entries.borrow().get(spec) {
            return Ok(scheme.clone());
        }
        let scheme = build(spec)?;
        debug!("Selecting {} '{spec}'", self.category.dictionary_name());
        self.entries
            .borrow_mut()
            .insert(spec.to_string(), scheme.clone());
        Ok(scheme)
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
