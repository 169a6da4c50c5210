use indexmap::IndexMap;

/// The model accepts `generationConfig.imageConfig` (aspect ratio and size).
pub const CAPABILITY_IMAGE_CONFIG: &str = "image_config";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub label: String,
    pub capabilities: Vec<String>,
}

impl ModelSpec {
    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|item| item == capability)
    }

    /// Flash variants reject `imageConfig` whatever their entry claims.
    pub fn supports_image_config(&self) -> bool {
        self.supports(CAPABILITY_IMAGE_CONFIG) && !is_flash_variant(&self.name)
    }

    /// Capabilities for an identifier the registry does not know.
    ///
    /// Flash variants reject `imageConfig`, so any identifier containing
    /// `flash` (any case) is treated as one.
    pub fn inferred(name: &str) -> Self {
        let trimmed = name.trim();
        let (label, capabilities) = if is_flash_variant(trimmed) {
            ("Flash", Vec::new())
        } else {
            ("Pro", vec![CAPABILITY_IMAGE_CONFIG.to_string()])
        };
        Self {
            name: trimmed.to_string(),
            label: label.to_string(),
            capabilities,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    /// Registry entry for `name`, or capabilities inferred from the identifier.
    /// A `models/` prefix is ignored for the lookup.
    pub fn resolve(&self, name: &str) -> ModelSpec {
        let trimmed = name.trim();
        let bare = trimmed.strip_prefix("models/").unwrap_or(trimmed);
        match self.get(bare) {
            Some(spec) => ModelSpec {
                name: trimmed.to_string(),
                ..spec.clone()
            },
            None => ModelSpec::inferred(trimmed),
        }
    }
}

fn is_flash_variant(name: &str) -> bool {
    name.to_ascii_lowercase().contains("flash")
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str, label: &str, capabilities: &[&str]| {
        map.insert(
            name.to_string(),
            ModelSpec {
                name: name.to_string(),
                label: label.to_string(),
                capabilities: capabilities
                    .iter()
                    .map(|item| (*item).to_string())
                    .collect(),
            },
        );
    };

    insert("gemini-3-pro-image-preview", "Pro", &[CAPABILITY_IMAGE_CONFIG]);
    insert("gemini-2.5-flash-image", "Flash", &[]);
    insert("gemini-2.5-flash-image-preview", "Flash", &[]);

    map
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::{is_flash_variant, ModelRegistry, ModelSpec, CAPABILITY_IMAGE_CONFIG};

    #[test]
    fn registered_flash_models_never_accept_image_config() {
        let registry = ModelRegistry::default();
        for model in registry.list() {
            assert_eq!(
                model.supports_image_config(),
                !is_flash_variant(&model.name),
                "registry entry {} disagrees with its variant",
                model.name
            );
        }
    }

    #[test]
    fn unknown_identifiers_infer_capabilities_from_name() {
        let registry = ModelRegistry::default();
        for name in ["gemini-9-FLASH-image", "Flash-experimental", "x-flash"] {
            assert!(!registry.resolve(name).supports_image_config(), "{name}");
        }
        for name in ["gemini-4-pro-image", "imagen-ultra"] {
            assert!(registry.resolve(name).supports_image_config(), "{name}");
        }
        assert_eq!(registry.resolve("gemini-2.5-flash-image").label, "Flash");
    }

    #[test]
    fn resolve_keeps_models_prefix_in_name() {
        let spec = ModelRegistry::default().resolve("models/gemini-3-pro-image-preview");
        assert_eq!(spec.name, "models/gemini-3-pro-image-preview");
        assert!(spec.supports_image_config());
    }

    #[test]
    fn custom_flash_entry_cannot_claim_image_config() {
        let mut models = IndexMap::new();
        models.insert(
            "Gemini-2.5-FLASH-image".to_string(),
            ModelSpec {
                name: "Gemini-2.5-FLASH-image".to_string(),
                label: "Flash".to_string(),
                capabilities: vec![CAPABILITY_IMAGE_CONFIG.to_string()],
            },
        );
        let registry = ModelRegistry::new(Some(models));
        let spec = registry.resolve("Gemini-2.5-FLASH-image");
        assert!(spec.supports(CAPABILITY_IMAGE_CONFIG));
        assert!(!spec.supports_image_config());
    }

    #[test]
    fn custom_registry_overrides_defaults() {
        let mut models = IndexMap::new();
        models.insert(
            "house-model".to_string(),
            ModelSpec {
                name: "house-model".to_string(),
                label: "House".to_string(),
                capabilities: vec![CAPABILITY_IMAGE_CONFIG.to_string()],
            },
        );
        let registry = ModelRegistry::new(Some(models));
        assert!(registry.get("gemini-3-pro-image-preview").is_none());
        assert_eq!(registry.resolve("house-model").label, "House");
    }
}
