use crate::error::{Result, SimtuneError};
use crate::types::GeneVector;
use rand::Rng;

/// One categorical configuration slot: its name and the finite set of
/// legal scheme ids.
#[derive(Debug, Clone)]
pub struct SlotSpec {
    pub name: &'static str,
    pub domain: Vec<u32>,
}

impl SlotSpec {
    pub fn new(name: &'static str, domain: &[u32]) -> Self {
        Self {
            name,
            domain: domain.to_vec(),
        }
    }

    pub fn contains(&self, value: u32) -> bool {
        self.domain.contains(&value)
    }
}

/// Directed compatibility rule: if `when_slot` holds `when_value`, then
/// `then_slot` must be one of `allowed`. Violations rewrite `then_slot` to
/// the first allowed value, so repair is deterministic.
#[derive(Debug, Clone)]
pub struct RepairRule {
    pub when_slot: usize,
    pub when_value: u32,
    pub then_slot: usize,
    pub allowed: Vec<u32>,
}

/// Declares the ordered slots of the configuration suite, their value
/// domains, and the cross-slot compatibility rules. Every vector returned
/// by `random_gene_vector` or `repair` satisfies all declared rules.
#[derive(Debug, Clone)]
pub struct GeneSchema {
    slots: Vec<SlotSpec>,
    rules: Vec<RepairRule>,
}

impl GeneSchema {
    pub fn new(slots: Vec<SlotSpec>) -> Self {
        Self {
            slots,
            rules: Vec::new(),
        }
    }

    /// Declare a rule by slot name. Rules apply in declaration order and
    /// must form a DAG over slots so repair reaches a fixed point.
    pub fn with_rule(
        mut self,
        when_slot: &str,
        when_value: u32,
        then_slot: &str,
        allowed: &[u32],
    ) -> Result<Self> {
        let when = self.require_slot(when_slot)?;
        let then = self.require_slot(then_slot)?;
        if allowed.is_empty() {
            return Err(SimtuneError::Schema(format!(
                "rule on '{}' has an empty allowed set",
                then_slot
            )));
        }
        for &v in allowed {
            if !self.slots[then].contains(v) {
                return Err(SimtuneError::Schema(format!(
                    "rule allows {} for slot '{}' which is outside its domain",
                    v, then_slot
                )));
            }
        }
        self.rules.push(RepairRule {
            when_slot: when,
            when_value,
            then_slot: then,
            allowed: allowed.to_vec(),
        });
        Ok(self)
    }

    /// The seven-slot physics suite searched by the reference workflow.
    ///
    /// Compatibility rules: each boundary-layer scheme runs only on its
    /// matching surface-layer scheme, the CAM longwave scheme pairs with
    /// CAM shortwave, and the Pleim-Xiu surface layer requires the
    /// Pleim-Xiu land-surface model.
    pub fn suite_default() -> Self {
        let schema = Self::new(vec![
            SlotSpec::new("microphysics", &[1, 2, 3, 4, 6, 8, 10]),
            SlotSpec::new("longwave_radiation", &[1, 3, 4]),
            SlotSpec::new("shortwave_radiation", &[1, 2, 3, 4]),
            SlotSpec::new("surface_layer", &[1, 2, 7]),
            SlotSpec::new("land_surface", &[1, 2, 7]),
            SlotSpec::new("boundary_layer", &[1, 2, 7]),
            SlotSpec::new("cumulus", &[1, 2, 3, 5]),
        ]);
        schema
            .with_rule("boundary_layer", 1, "surface_layer", &[1])
            .and_then(|s| s.with_rule("boundary_layer", 2, "surface_layer", &[2]))
            .and_then(|s| s.with_rule("boundary_layer", 7, "surface_layer", &[7, 1]))
            .and_then(|s| s.with_rule("longwave_radiation", 3, "shortwave_radiation", &[3]))
            .and_then(|s| s.with_rule("surface_layer", 7, "land_surface", &[7]))
            .expect("default suite schema is well-formed")
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[SlotSpec] {
        &self.slots
    }

    pub fn slot_names(&self) -> Vec<&'static str> {
        self.slots.iter().map(|s| s.name).collect()
    }

    pub fn slot_index(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.name == name)
    }

    fn require_slot(&self, name: &str) -> Result<usize> {
        self.slot_index(name)
            .ok_or_else(|| SimtuneError::Schema(format!("unknown slot '{}'", name)))
    }

    /// Draw one value per slot uniformly from its domain, then repair.
    pub fn random_gene_vector<R: Rng>(&self, rng: &mut R) -> GeneVector {
        let drawn: GeneVector = self
            .slots
            .iter()
            .map(|slot| slot.domain[rng.gen_range(0..slot.domain.len())])
            .collect();
        // Drawn values are all in-domain, so repair cannot fail here.
        self.repair(&drawn)
            .expect("repair of an in-domain vector succeeds")
    }

    /// Rewrite `genes` until every compatibility rule holds. Rules apply
    /// in declaration order; passes are bounded by the slot count, which
    /// covers any rule chain over a DAG of slots.
    pub fn repair(&self, genes: &GeneVector) -> Result<GeneVector> {
        if genes.len() != self.slots.len() {
            return Err(SimtuneError::Schema(format!(
                "gene vector has {} slots, schema declares {}",
                genes.len(),
                self.slots.len()
            )));
        }
        for (i, slot) in self.slots.iter().enumerate() {
            if !slot.contains(genes[i]) {
                return Err(SimtuneError::Schema(format!(
                    "value {} is outside the domain of slot '{}'",
                    genes[i], slot.name
                )));
            }
        }

        let mut repaired = genes.clone();
        for _ in 0..=self.slots.len() {
            let mut changed = false;
            for rule in &self.rules {
                if repaired[rule.when_slot] == rule.when_value
                    && !rule.allowed.contains(&repaired[rule.then_slot])
                {
                    repaired[rule.then_slot] = rule.allowed[0];
                    changed = true;
                }
            }
            if !changed {
                return Ok(repaired);
            }
        }
        Err(SimtuneError::Schema(
            "repair did not reach a fixed point; rules do not form a DAG".to_string(),
        ))
    }

    /// True when every slot value is in-domain and every rule holds.
    pub fn is_feasible(&self, genes: &GeneVector) -> bool {
        if genes.len() != self.slots.len() {
            return false;
        }
        let in_domain = self
            .slots
            .iter()
            .zip(genes)
            .all(|(slot, &value)| slot.contains(value));
        in_domain
            && self.rules.iter().all(|rule| {
                genes[rule.when_slot] != rule.when_value
                    || rule.allowed.contains(&genes[rule.then_slot])
            })
    }

    /// Smallest feasible sum of one value per slot. Used by the demo and
    /// tests as the known optimum of the `sum(genes)` stub fitness.
    pub fn min_feasible_sum(&self) -> f64 {
        let mut best = f64::INFINITY;
        let mut genes: GeneVector = vec![0; self.slots.len()];
        self.enumerate_sums(0, &mut genes, &mut best);
        best
    }

    fn enumerate_sums(&self, slot: usize, genes: &mut GeneVector, best: &mut f64) {
        if slot == self.slots.len() {
            if self.is_feasible(genes) {
                let sum: u32 = genes.iter().sum();
                *best = best.min(sum as f64);
            }
            return;
        }
        for &value in &self.slots[slot].domain {
            genes[slot] = value;
            self.enumerate_sums(slot + 1, genes, best);
        }
    }
}
