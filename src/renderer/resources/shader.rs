use std::fmt;
use std::str::FromStr;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use naga::back::spv;
use naga::valid::{Capabilities, ModuleInfo, ValidationFlags, Validator};
use naga::{AddressSpace, Binding, TypeInner};
use crate::renderer::backend::desc::{BindingCategory, BindingLayout, ShaderVisibility};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Pixel,
}

impl ShaderStage {
    fn to_naga(self) -> naga::ShaderStage {
        match self {
            Self::Vertex => naga::ShaderStage::Vertex,
            Self::Pixel => naga::ShaderStage::Fragment,
        }
    }

    fn from_naga(stage: naga::ShaderStage) -> Option<Self> {
        match stage {
            naga::ShaderStage::Vertex => Some(Self::Vertex),
            naga::ShaderStage::Fragment => Some(Self::Pixel),
            naga::ShaderStage::Compute => None,
        }
    }

    pub fn visibility(self) -> ShaderVisibility {
        match self {
            Self::Vertex => ShaderVisibility::Vertex,
            Self::Pixel => ShaderVisibility::Pixel,
        }
    }
}

/// Compilation target written as `<stage>_<major>_<minor>`, e.g. `vs_1_3` for a vertex
/// shader emitted as SPIR-V 1.3
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ShaderProfile {
    pub stage: ShaderStage,
    pub version: (u8, u8),
}

impl FromStr for ShaderProfile {
    type Err = color_eyre::Report;

    fn from_str(profile: &str) -> Result<Self> {
        let mut parts = profile.split('_');

        let stage = match parts.next() {
            Some("vs") => ShaderStage::Vertex,
            Some("ps") => ShaderStage::Pixel,
            _ => return Err(eyre!("Unknown shader stage in profile {:?}", profile)),
        };

        let major = parts.next().and_then(|part| part.parse::<u8>().ok());
        let minor = parts.next().and_then(|part| part.parse::<u8>().ok());
        match (major, minor, parts.next()) {
            (Some(1), Some(minor), None) if minor <= 6 => Ok(Self {
                stage,
                version: (1, minor),
            }),
            _ => Err(eyre!("Unsupported shader profile {:?}", profile)),
        }
    }
}

impl fmt::Display for ShaderProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.stage {
            ShaderStage::Vertex => "vs",
            ShaderStage::Pixel => "ps",
        };
        write!(f, "{}_{}_{}", prefix, self.version.0, self.version.1)
    }
}

/// SPIR-V for a single entry point
#[derive(Debug, Clone)]
pub struct CompiledShader {
    pub stage: ShaderStage,
    pub entry_point: String,
    pub words: Vec<u32>,
}

/// A resource binding declared by the shader source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectedBinding {
    pub group: u32,
    pub binding: u32,
    pub category: BindingCategory,
    pub name: Option<String>,
    /// Stages whose entry points actually access the resource
    pub used_by: Vec<ShaderStage>,
}

/// WGSL source that passed parsing and validation
pub struct ParsedShader {
    module: naga::Module,
    info: ModuleInfo,
}

impl ParsedShader {
    pub fn parse(source: &str) -> Result<Self> {
        let module = naga::front::wgsl::parse_str(source)
            .map_err(|error| eyre!("Shader failed to parse:\n{}", error.emit_to_string(source)))?;

        let info = Validator::new(ValidationFlags::all(), Capabilities::all())
            .validate(&module)
            .map_err(|error| eyre!("Shader failed to validate:\n{}", error.emit_to_string(source)))?;

        Ok(Self { module, info })
    }

    pub fn reflect_bindings(&self) -> Result<Vec<ReflectedBinding>> {
        let mut bindings = Vec::new();

        for (handle, variable) in self.module.global_variables.iter() {
            let Some(resource_binding) = variable.binding.as_ref() else {
                continue;
            };

            let category = match (variable.space, &self.module.types[variable.ty].inner) {
                (AddressSpace::Uniform, _) => BindingCategory::ConstantBuffer,
                (AddressSpace::Handle, TypeInner::Image { .. }) => BindingCategory::ShaderResource,
                (AddressSpace::Handle, TypeInner::Sampler { .. }) => BindingCategory::Sampler,
                (space, _) => {
                    return Err(eyre!(
                        "Unsupported resource {:?} in address space {:?}",
                        variable.name,
                        space,
                    ));
                }
            };

            let mut used_by = Vec::new();
            for (index, entry) in self.module.entry_points.iter().enumerate() {
                if self.info.get_entry_point(index)[handle].is_empty() {
                    continue;
                }
                if let Some(stage) = ShaderStage::from_naga(entry.stage) {
                    if !used_by.contains(&stage) {
                        used_by.push(stage);
                    }
                }
            }

            bindings.push(ReflectedBinding {
                group: resource_binding.group,
                binding: resource_binding.binding,
                category,
                name: variable.name.clone(),
                used_by,
            });
        }

        bindings.sort_by_key(|binding| (binding.group, binding.binding));
        Ok(bindings)
    }

    /// Fails if a resource the shader declares does not sit in the matching table of `layout`,
    /// or if a stage reads it from a table that stage cannot see
    pub fn check_bindings(&self, layout: &BindingLayout) -> Result<()> {
        for reflected in self.reflect_bindings()? {
            if reflected.group != 0 {
                return Err(eyre!(
                    "Shader resource {:?} uses group {}, only group 0 is bound",
                    reflected.name,
                    reflected.group,
                ));
            }

            let parameter = layout
                .parameters
                .get(reflected.binding as usize)
                .ok_or_else(|| eyre!(
                    "Shader resource {:?} at binding {} has no table in the binding layout",
                    reflected.name,
                    reflected.binding,
                ))?;

            if parameter.category != reflected.category {
                return Err(eyre!(
                    "Shader resource {:?} is a {:?} but table {} holds {:?}",
                    reflected.name,
                    reflected.category,
                    reflected.binding,
                    parameter.category,
                ));
            }

            if let Some(stage) = reflected
                .used_by
                .iter()
                .find(|stage| !parameter.visibility.includes(stage.visibility()))
            {
                return Err(eyre!(
                    "Shader resource {:?} is read by the {:?} stage but table {} is only visible to {:?}",
                    reflected.name,
                    stage,
                    reflected.binding,
                    parameter.visibility,
                ));
            }
        }

        Ok(())
    }

    /// Sorted `@location`s the vertex entry point reads, struct members included
    pub fn vertex_input_locations(&self, entry_point: &str) -> Result<Vec<u32>> {
        let entry = self.entry_point(entry_point, ShaderStage::Vertex)?;

        let mut locations = Vec::new();
        for argument in &entry.function.arguments {
            match &argument.binding {
                Some(Binding::Location { location, .. }) => locations.push(*location),
                Some(Binding::BuiltIn(_)) => {}
                None => {
                    if let TypeInner::Struct { members, .. } = &self.module.types[argument.ty].inner {
                        locations.extend(members.iter().filter_map(|member| match member.binding {
                            Some(Binding::Location { location, .. }) => Some(location),
                            _ => None,
                        }));
                    }
                }
            }
        }

        locations.sort_unstable();
        Ok(locations)
    }

    pub fn compile(&self, entry_point: &str, profile: ShaderProfile) -> Result<CompiledShader> {
        self.entry_point(entry_point, profile.stage)?;

        let options = spv::Options {
            lang_version: profile.version,
            ..Default::default()
        };
        let pipeline_options = spv::PipelineOptions {
            shader_stage: profile.stage.to_naga(),
            entry_point: entry_point.to_string(),
        };

        let words = spv::write_vec(&self.module, &self.info, &options, Some(&pipeline_options))
            .map_err(|error| eyre!("Failed to emit {} for {}: {}", profile, entry_point, error))?;

        log::debug!("Compiled {} ({}): {} words", entry_point, profile, words.len());

        Ok(CompiledShader {
            stage: profile.stage,
            entry_point: entry_point.to_string(),
            words,
        })
    }

    fn entry_point(&self, name: &str, stage: ShaderStage) -> Result<&naga::EntryPoint> {
        self.module
            .entry_points
            .iter()
            .find(|entry| entry.name == name && entry.stage == stage.to_naga())
            .ok_or_else(|| eyre!("Shader has no {:?} entry point named {:?}", stage, name))
    }
}
