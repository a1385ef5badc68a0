use std::ops::Index;

use ahash::AHashMap;

use crate::{errors::GraphQueryError, instance::Instance, step::Step};

/// Ordered, parent-linked collection of steps. Only validated appends are exposed so the
/// root/parent invariant cannot be bypassed.
#[derive(Clone, Debug, Default)]
pub struct QueryPlan {
    steps: Vec<Step>,
    index: AHashMap<String, usize>,
}

impl QueryPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_steps<I>(steps: I) -> Result<Self, GraphQueryError>
    where
        I: IntoIterator<Item = Step>,
    {
        let mut plan = Self::new();
        plan.extend(steps)?;
        Ok(plan)
    }

    pub fn append(&mut self, step: Step) -> Result<(), GraphQueryError> {
        if self.index.contains_key(&step.name) {
            return Err(GraphQueryError::invalid_plan(format!(
                "duplicate step name {}",
                step.name
            )));
        }
        match (self.steps.is_empty(), step.parent_name.as_deref()) {
            (true, Some(parent)) => {
                return Err(GraphQueryError::invalid_plan(format!(
                    "first step {} cannot traverse from {parent}",
                    step.name
                )));
            }
            (false, None) => {
                return Err(GraphQueryError::invalid_plan(format!(
                    "step {} must traverse from an earlier step",
                    step.name
                )));
            }
            (false, Some(parent)) if !self.index.contains_key(parent) => {
                return Err(GraphQueryError::invalid_plan(format!(
                    "step {} references unknown parent {parent}",
                    step.name
                )));
            }
            _ => {}
        }
        self.index.insert(step.name.clone(), self.steps.len());
        self.steps.push(step);
        Ok(())
    }

    pub fn extend<I>(&mut self, steps: I) -> Result<(), GraphQueryError>
    where
        I: IntoIterator<Item = Step>,
    {
        for step in steps {
            self.append(step)?;
        }
        Ok(())
    }

    /// Fresh step name derived from `parent_name`; the root is always `"0"`.
    pub fn create_name(&self, parent_name: Option<&str>) -> String {
        match parent_name {
            None => "0".to_string(),
            Some(parent) => {
                let mut counter = self.steps.len();
                let mut name = format!("{parent}_{counter}");
                while self.index.contains_key(&name) {
                    counter += 1;
                    name = format!("{parent}_{counter}");
                }
                name
            }
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn root(&self) -> Option<&Step> {
        self.steps.first()
    }

    pub fn get(&self, position: usize) -> Option<&Step> {
        self.steps.get(position)
    }

    pub fn step(&self, name: &str) -> Option<&Step> {
        self.index.get(name).map(|&position| &self.steps[position])
    }

    pub fn step_mut(&mut self, name: &str) -> Option<&mut Step> {
        match self.index.get(name) {
            Some(&position) => self.steps.get_mut(position),
            None => None,
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Step> {
        self.steps.iter()
    }

    pub(crate) fn steps_mut(&mut self) -> std::slice::IterMut<'_, Step> {
        self.steps.iter_mut()
    }

    pub fn reset(&mut self) {
        for step in &mut self.steps {
            step.reset();
        }
    }

    /// Current cursor of every natively-queryable step.
    pub fn cursors(&self) -> AHashMap<String, Option<String>> {
        self.steps
            .iter()
            .filter(|step| step.is_natively_queryable())
            .map(|step| (step.name.clone(), step.cursor().map(str::to_string)))
            .collect()
    }

    pub fn is_exhausted(&self) -> bool {
        self.root().is_none_or(Step::is_finished)
    }

    /// Halves every step's adaptive cap. True if at least one step is still above the floor.
    pub fn reduce_batch_caps(&mut self) -> bool {
        let mut any_usable = false;
        for step in &mut self.steps {
            any_usable |= step.reduce_batch_cap();
        }
        any_usable
    }

    pub fn tree(&self) -> PlanTree {
        PlanTree::build(self)
    }

    pub fn results_by_step(&self) -> AHashMap<&str, &[Instance]> {
        self.steps
            .iter()
            .map(|step| (step.name.as_str(), step.results()))
            .collect()
    }
}

impl Index<usize> for QueryPlan {
    type Output = Step;

    fn index(&self, position: usize) -> &Step {
        &self.steps[position]
    }
}

impl<'a> IntoIterator for &'a QueryPlan {
    type Item = &'a Step;
    type IntoIter = std::slice::Iter<'a, Step>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}

/// Parent to children adjacency derived from a plan's parent links.
#[derive(Clone, Debug, Default)]
pub struct PlanTree {
    root: Option<String>,
    children: AHashMap<String, Vec<String>>,
}

impl PlanTree {
    pub fn build(plan: &QueryPlan) -> Self {
        let mut children: AHashMap<String, Vec<String>> = AHashMap::new();
        for step in plan {
            children.entry(step.name.clone()).or_default();
            if let Some(parent) = step.parent_name.as_ref() {
                children
                    .entry(parent.clone())
                    .or_default()
                    .push(step.name.clone());
            }
        }
        Self {
            root: plan.root().map(|step| step.name.clone()),
            children,
        }
    }

    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    pub fn children(&self, name: &str) -> &[String] {
        self.children.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_leaf(&self, name: &str) -> bool {
        self.children(name).is_empty()
    }
}
