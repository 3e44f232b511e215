//! The `fvSchemes` dictionary.
//!
//! Each category maps a term key such as `div(phi,T)` to a scheme
//! specification string. A `default` entry answers for keys that are not
//! listed explicitly; a default of `none` disables the fallback.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IoError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SchemeCategory {
    Ddt,
    D2dt2,
    Grad,
    Div,
    Laplacian,
    Interpolation,
    SnGrad,
}

impl SchemeCategory {
    pub fn dictionary_name(self) -> &'static str {
        match self {
            SchemeCategory::Ddt => "ddtSchemes",
            SchemeCategory::D2dt2 => "d2dt2Schemes",
            SchemeCategory::Grad => "gradSchemes",
            SchemeCategory::Div => "divSchemes",
            SchemeCategory::Laplacian => "laplacianSchemes",
            SchemeCategory::Interpolation => "interpolationSchemes",
            SchemeCategory::SnGrad => "snGradSchemes",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FvSchemes {
    #[serde(default)]
    pub ddt_schemes: BTreeMap<String, String>,
    #[serde(default)]
    pub d2dt2_schemes: BTreeMap<String, String>,
    #[serde(default)]
    pub grad_schemes: BTreeMap<String, String>,
    #[serde(default)]
    pub div_schemes: BTreeMap<String, String>,
    #[serde(default)]
    pub laplacian_schemes: BTreeMap<String, String>,
    #[serde(default)]
    pub interpolation_schemes: BTreeMap<String, String>,
    #[serde(default)]
    pub sn_grad_schemes: BTreeMap<String, String>,
    /// Fields whose matrices may reconstruct face fluxes.
    #[serde(default)]
    pub flux_required: Vec<String>,
}

impl FvSchemes {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        crate::read_json(path)
    }

    pub fn category(&self, category: SchemeCategory) -> &BTreeMap<String, String> {
        match category {
            SchemeCategory::Ddt => &self.ddt_schemes,
            SchemeCategory::D2dt2 => &self.d2dt2_schemes,
            SchemeCategory::Grad => &self.grad_schemes,
            SchemeCategory::Div => &self.div_schemes,
            SchemeCategory::Laplacian => &self.laplacian_schemes,
            SchemeCategory::Interpolation => &self.interpolation_schemes,
            SchemeCategory::SnGrad => &self.sn_grad_schemes,
        }
    }

    pub fn category_mut(&mut self, category: SchemeCategory) -> &mut BTreeMap<String, String> {
        match category {
            SchemeCategory::Ddt => &mut self.ddt_schemes,
            SchemeCategory::D2dt2 => &mut self.d2dt2_schemes,
            SchemeCategory::Grad => &mut self.grad_schemes,
            SchemeCategory::Div => &mut self.div_schemes,
            SchemeCategory::Laplacian => &mut self.laplacian_schemes,
            SchemeCategory::Interpolation => &mut self.interpolation_schemes,
            SchemeCategory::SnGrad => &mut self.sn_grad_schemes,
        }
    }

    /// Sets an entry, returning `self` for chained construction in tests
    /// and programmatic cases.
    pub fn with(mut self, category: SchemeCategory, key: &str, spec: &str) -> Self {
        self.category_mut(category)
            .insert(key.to_string(), spec.to_string());
        self
    }

    /// Resolves the specification string for `key`.
    pub fn lookup(&self, category: SchemeCategory, key: &str) -> Result<&str> {
        let table = self.category(category);
        if let Some(spec) = table.get(key) {
            return Ok(spec.as_str());
        }
        match table.get("default") {
            Some(spec) if spec.trim() != "none" => Ok(spec.as_str()),
            _ => Err(IoError::MissingEntry {
                dictionary: category.dictionary_name().to_string(),
                key: key.to_string(),
            }),
        }
    }

    pub fn flux_required(&self, field_name: &str) -> bool {
        self.flux_required.iter().any(|f| f == field_name)
    }

    pub fn set_flux_required(&mut self, field_name: &str) {
        if !self.flux_required(field_name) {
            self.flux_required.push(field_name.to_string());
        }
    }
}
