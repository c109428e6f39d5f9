// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Reading YAML source lists.

The file layout is a map of patch name to component list:

```yaml
CasA:
  - name: CasA
    ra: 350.85
    dec: 58.815
    comp_type: point
    flux:
      i: 8000.0
3C196:
  - name: 3C196
    ra: 123.4
    dec: 48.217
    comp_type:
      gaussian:
        maj: 120.0
        min: 60.0
        pa: 30.0
    flux:
      i: 83.0
      ref_freq: 150000000.0
      spectral_index: -0.7
```

On-disk angles are degrees (Gaussian axes: arcseconds); everything is
converted to radians on the way in.
 */

use std::{fs::File, io::BufReader, path::Path};

use indexmap::IndexMap;
use serde::Deserialize;
use vec1::Vec1;

use super::{
    ComponentType, FluxDensity, Patch, SourceComponent, SourceList, SourceListError,
};
use crate::coord::RADec;

const ARCSEC_TO_RAD: f64 = std::f64::consts::PI / (180.0 * 3600.0);

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum FileCompType {
    Point,
    Gaussian { maj: f64, min: f64, pa: f64 },
}

#[derive(Deserialize)]
struct FileComponent {
    name: String,
    /// \[degrees\]
    ra: f64,
    /// \[degrees\]
    dec: f64,
    // serde_yaml only reads the tag-free map form through the
    // singleton-map adapter.
    #[serde(with = "serde_yaml::with::singleton_map")]
    comp_type: FileCompType,
    flux: FluxDensity,
}

/// Read a source list from a YAML file.
pub fn read_source_list_file<P: AsRef<Path>>(path: P) -> Result<SourceList, SourceListError> {
    let f = BufReader::new(File::open(path)?);
    source_list_from_yaml(f)
}

/// Read a source list from anything that streams YAML.
pub fn source_list_from_yaml<R: std::io::Read>(reader: R) -> Result<SourceList, SourceListError> {
    let raw: IndexMap<String, Vec<FileComponent>> = serde_yaml::from_reader(reader)?;
    if raw.is_empty() {
        return Err(SourceListError::NoPatches);
    }

    let mut patches = IndexMap::with_capacity(raw.len());
    for (patch_name, comps) in raw {
        let mut components = Vec::with_capacity(comps.len());
        for comp in comps {
            if !comp.flux.i.is_finite() || comp.flux.i < 0.0 {
                return Err(SourceListError::InvalidFlux {
                    comp: comp.name,
                    i: comp.flux.i,
                });
            }
            if comp.flux.ref_freq <= 0.0 {
                return Err(SourceListError::InvalidRefFreq { comp: comp.name });
            }
            components.push(SourceComponent {
                radec: RADec::new_degrees(comp.ra, comp.dec),
                comp_type: match comp.comp_type {
                    FileCompType::Point => ComponentType::Point,
                    FileCompType::Gaussian { maj, min, pa } => ComponentType::Gaussian {
                        maj: maj * ARCSEC_TO_RAD,
                        min: min * ARCSEC_TO_RAD,
                        pa: pa.to_radians(),
                    },
                },
                flux: comp.flux,
                name: comp.name,
            });
        }
        let components = Vec1::try_from_vec(components)
            .map_err(|_| SourceListError::EmptyPatch(patch_name.clone()))?;
        patches.insert(patch_name, Patch { components });
    }
    Ok(SourceList::from(patches))
}
