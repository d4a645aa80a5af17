use std::collections::{btree_map, BTreeMap, BTreeSet, HashMap};

use prost_reflect::{DescriptorPool, MethodDescriptor};
use prost_types::FileDescriptorProto;

use crate::{error::DiscoveryError, reflection::ReflectionClient};

/// Every method exposed by the target, keyed by fully-qualified name (`package.Service.Method`).
///
/// All services share one flat namespace. Inserting a method whose name is already present
/// replaces the earlier entry.
#[derive(Debug, Clone, Default)]
pub struct ServiceCatalog {
    methods: HashMap<String, MethodDescriptor>,
}
impl ServiceCatalog {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn get(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.get(name)
    }
    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }
    pub fn len(&self) -> usize {
        self.methods.len()
    }
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
    pub fn names(&self) -> BTreeSet<&str> {
        self.methods.keys().map(String::as_str).collect()
    }
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MethodDescriptor)> {
        self.methods.iter().map(|(name, method)| (name.as_str(), method))
    }

    pub fn insert(&mut self, method: MethodDescriptor) -> Option<MethodDescriptor> {
        let replaced = self.methods.insert(method.full_name().to_string(), method);
        if let Some(old) = &replaced {
            tracing::debug!(method = old.full_name(), "method overwritten by later service");
        }
        replaced
    }
}
impl Extend<MethodDescriptor> for ServiceCatalog {
    fn extend<T: IntoIterator<Item = MethodDescriptor>>(&mut self, iter: T) {
        iter.into_iter().for_each(|method| {
            self.insert(method);
        });
    }
}
impl FromIterator<MethodDescriptor> for ServiceCatalog {
    fn from_iter<T: IntoIterator<Item = MethodDescriptor>>(iter: T) -> Self {
        let mut catalog = Self::new();
        catalog.extend(iter);
        catalog
    }
}

/// Build the catalog of every service the target lists through reflection.
pub async fn discover(client: &mut ReflectionClient) -> Result<ServiceCatalog, DiscoveryError> {
    let services = client.list_services().await?;
    tracing::info!(count = services.len(), "services listed");

    let mut files = BTreeMap::new();
    collect(&mut files, client.files_containing_symbols(services.iter().cloned()).await?);
    loop {
        let missing = missing_dependencies(&files);
        if missing.is_empty() {
            break;
        }
        let fetched = client.files_by_filenames(missing.iter().cloned()).await?;
        collect(&mut files, fetched);
        if let Some(file) = missing.into_iter().find(|name| !files.contains_key(name)) {
            return Err(DiscoveryError::MissingFile(file));
        }
    }

    let mut pool = DescriptorPool::new();
    pool.add_file_descriptor_protos(files.into_values())?;

    let mut catalog = ServiceCatalog::new();
    for name in &services {
        let service = pool.get_service_by_name(name).ok_or_else(|| DiscoveryError::UnresolvedService(name.clone()))?;
        for method in service.methods() {
            tracing::info!("Method: {}", method.full_name());
            catalog.insert(method);
        }
    }
    Ok(catalog)
}

fn collect(files: &mut BTreeMap<String, FileDescriptorProto>, fetched: Vec<FileDescriptorProto>) {
    for file in fetched {
        if let btree_map::Entry::Vacant(entry) = files.entry(file.name().to_string()) {
            entry.insert(file);
        }
    }
}

fn missing_dependencies(files: &BTreeMap<String, FileDescriptorProto>) -> BTreeSet<String> {
    files.values().flat_map(|file| file.dependency.iter()).filter(|dep| !files.contains_key(*dep)).cloned().collect()
}
