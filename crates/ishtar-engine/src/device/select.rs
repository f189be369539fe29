use wgpu::DeviceType;

/// Capability snapshot of one enumerated adapter.
///
/// Plain data so that ranking stays independent of live GPU handles.
#[derive(Debug, Clone)]
pub struct AdapterProfile {
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: DeviceType,

    /// Upper bound on invocations in a single compute workgroup.
    pub max_invocations: u32,
}

impl AdapterProfile {
    /// Snapshots the fields relevant for ranking from a live adapter.
    pub fn of(adapter: &wgpu::Adapter) -> Self {
        let info = adapter.get_info();
        let limits = adapter.limits();
        Self {
            name: info.name,
            backend: info.backend,
            device_type: info.device_type,
            max_invocations: limits.max_compute_invocations_per_workgroup,
        }
    }

    /// Throughput score: hardware-class weight times parallel width.
    ///
    /// Discrete hardware outranks integrated parts, which outrank virtual
    /// devices and software rasterizers; the workgroup invocation limit
    /// separates devices of the same class.
    pub fn score(&self) -> u64 {
        class_weight(self.device_type) as u64 * self.max_invocations as u64
    }
}

fn class_weight(ty: DeviceType) -> u32 {
    match ty {
        DeviceType::DiscreteGpu => 1000,
        DeviceType::IntegratedGpu => 100,
        DeviceType::VirtualGpu => 10,
        DeviceType::Cpu => 1,
        DeviceType::Other => 1,
    }
}

/// Index of the best-scoring profile.
///
/// Linear max-scan with a strictly-greater comparison starting from zero:
/// the first adapter wins ties, and a list where nothing scores above zero
/// selects nothing.
pub(crate) fn best_index(profiles: &[AdapterProfile]) -> Option<usize> {
    let mut best = None;
    let mut top = 0u64;

    for (i, profile) in profiles.iter().enumerate() {
        let score = profile.score();
        log::debug!(
            "adapter candidate {:?} [{:?}, {:?}]: score {}",
            profile.name,
            profile.backend,
            profile.device_type,
            score,
        );
        if score > top {
            best = Some(i);
            top = score;
        }
    }

    best
}

/// Enumerates every adapter on every backend and returns the best-scoring
/// one, or `None` when nothing usable is present.
///
/// Callers that need a device regardless should fall back to
/// `Instance::request_adapter`.
pub fn select_adapter(instance: &wgpu::Instance) -> Option<wgpu::Adapter> {
    let adapters = pollster::block_on(instance.enumerate_adapters(wgpu::Backends::all()));
    let profiles: Vec<AdapterProfile> = adapters.iter().map(AdapterProfile::of).collect();

    let idx = best_index(&profiles)?;
    log::info!(
        "selected adapter {:?} [{:?}] with score {}",
        profiles[idx].name,
        profiles[idx].backend,
        profiles[idx].score(),
    );

    adapters.into_iter().nth(idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(device_type: DeviceType, max_invocations: u32) -> AdapterProfile {
        AdapterProfile {
            name: "mock".to_string(),
            backend: wgpu::Backend::Noop,
            device_type,
            max_invocations,
        }
    }

    // ── score ─────────────────────────────────────────────────────────────

    #[test]
    fn discrete_class_outranks_wider_integrated() {
        let discrete = profile(DeviceType::DiscreteGpu, 256);
        let integrated = profile(DeviceType::IntegratedGpu, 1024);
        assert!(discrete.score() > integrated.score());
    }

    #[test]
    fn invocation_limit_separates_same_class() {
        let narrow = profile(DeviceType::DiscreteGpu, 256);
        let wide = profile(DeviceType::DiscreteGpu, 1024);
        assert!(wide.score() > narrow.score());
    }

    // ── best_index ────────────────────────────────────────────────────────

    #[test]
    fn highest_score_is_selected() {
        let list = vec![
            profile(DeviceType::Cpu, 1024),
            profile(DeviceType::DiscreteGpu, 1024),
            profile(DeviceType::IntegratedGpu, 1024),
        ];
        assert_eq!(best_index(&list), Some(1));
    }

    #[test]
    fn tie_resolves_to_first() {
        let list = vec![
            profile(DeviceType::DiscreteGpu, 512),
            profile(DeviceType::DiscreteGpu, 512),
        ];
        assert_eq!(best_index(&list), Some(0));
    }

    #[test]
    fn empty_list_selects_nothing() {
        assert_eq!(best_index(&[]), None);
    }

    #[test]
    fn all_zero_scores_select_nothing() {
        let list = vec![
            profile(DeviceType::Other, 0),
            profile(DeviceType::Cpu, 0),
        ];
        assert_eq!(best_index(&list), None);
    }

    #[test]
    fn later_strictly_better_replaces_earlier() {
        let list = vec![
            profile(DeviceType::IntegratedGpu, 256),
            profile(DeviceType::IntegratedGpu, 257),
        ];
        assert_eq!(best_index(&list), Some(1));
    }
}
