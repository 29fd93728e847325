//! First-fit packing of consumers onto providers.

use std::cmp::Reverse;

use super::ScalerError;
use super::resource::{ResourceConsumer, ResourceProvider};

/// Providers after packing, plus consumers no instance could ever hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Distribution {
    pub providers: Vec<ResourceProvider>,
    pub incompatible: Vec<String>,
}

type Sorter = fn(&mut [ResourceProvider], &mut [ResourceConsumer]);

fn by_cpu(providers: &mut [ResourceProvider], consumers: &mut [ResourceConsumer]) {
    providers.sort_by_key(|p| p.available_cpu);
    providers.sort_by_key(|p| Reverse(p.in_use));
    consumers.sort_by_key(|c| c.cpu);
}

fn by_memory(providers: &mut [ResourceProvider], consumers: &mut [ResourceConsumer]) {
    providers.sort_by_key(|p| p.available_memory);
    providers.sort_by_key(|p| Reverse(p.in_use));
    consumers.sort_by_key(|c| c.memory);
}

/// Places every consumer on the first provider with room, opening copies of
/// `new_instance` as needed. Runs once ordered by CPU and once by memory and
/// keeps whichever needs fewer providers.
pub fn calculate_scale_up(
    providers: &[ResourceProvider],
    consumers: &[ResourceConsumer],
    new_instance: &ResourceProvider,
) -> Result<Distribution, ScalerError> {
    let sorters: [Sorter; 2] = [by_cpu, by_memory];
    let mut best: Option<Distribution> = None;

    for sort in sorters {
        let distribution = pack(providers, consumers, new_instance, sort)?;
        let better = best
            .as_ref()
            .is_none_or(|b| distribution.providers.len() < b.providers.len());
        if better {
            best = Some(distribution);
        }
    }

    Ok(best.unwrap_or_else(|| Distribution {
        providers: providers.to_vec(),
        incompatible: Vec::new(),
    }))
}

fn pack(
    providers: &[ResourceProvider],
    consumers: &[ResourceConsumer],
    new_instance: &ResourceProvider,
    sort: Sorter,
) -> Result<Distribution, ScalerError> {
    let mut pool = providers.to_vec();
    let mut consumers = consumers.to_vec();
    if pool.is_empty() && !consumers.is_empty() {
        pool.push(new_instance.clone());
    }
    sort(&mut pool, &mut consumers);

    let mut incompatible = Vec::new();
    for consumer in &consumers {
        if let Some(provider) = pool.iter_mut().find(|p| p.has_resources_for(consumer)) {
            provider.subtract_resources_for(consumer)?;
            continue;
        }

        let mut fresh = new_instance.clone();
        if !fresh.has_resources_for(consumer) {
            incompatible.push(consumer.id.clone());
            continue;
        }
        fresh.subtract_resources_for(consumer)?;
        pool.push(fresh);
    }

    Ok(Distribution {
        providers: pool,
        incompatible,
    })
}

/// Providers nothing runs on.
pub fn calculate_scale_down(providers: &[ResourceProvider]) -> Vec<ResourceProvider> {
    providers.iter().filter(|p| !p.in_use).cloned().collect()
}
