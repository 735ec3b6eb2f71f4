use std::fmt;

use anyhow::bail;

/// A rectangular region: `count[i]` elements from `start[i]` along each dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hyperslab {
    pub start: Vec<u64>,
    pub count: Vec<u64>,
}

impl Hyperslab {
    pub fn whole(dims: &[u64]) -> Self {
        Hyperslab {
            start: vec![0; dims.len()],
            count: dims.to_vec(),
        }
    }

    pub fn len(&self) -> u64 {
        product(&self.count)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn product(dims: &[u64]) -> u64 {
    dims.iter().fold(1_u64, |acc, d| acc.saturating_mul(*d))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataspace {
    dims: Vec<u64>,
    max_dims: Vec<Option<u64>>,
    selection: Option<Hyperslab>,
}

impl Dataspace {
    pub fn new(dims: &[u64], max_dims: &[Option<u64>]) -> anyhow::Result<Self> {
        if dims.is_empty() {
            bail!("dataspace must have at least one dimension");
        }
        if dims.len() != max_dims.len() {
            bail!(
                "rank of dims ({}) and max dims ({}) differ",
                dims.len(),
                max_dims.len()
            );
        }
        for (d, m) in dims.iter().zip(max_dims) {
            if let Some(m) = m {
                if d > m {
                    bail!("dimension {} exceeds its maximum {}", d, m);
                }
            }
        }
        Ok(Dataspace {
            dims: dims.to_vec(),
            max_dims: max_dims.to_vec(),
            selection: None,
        })
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[u64] {
        &self.dims
    }

    pub fn max_dims(&self) -> &[Option<u64>] {
        &self.max_dims
    }

    /// Replaces any previous selection.
    pub fn select(&mut self, start: &[u64], count: &[u64]) -> anyhow::Result<()> {
        if start.len() != self.rank() || count.len() != self.rank() {
            bail!(
                "hyperslab of rank {}/{} on a rank {} dataspace",
                start.len(),
                count.len(),
                self.rank()
            );
        }
        for ((s, c), d) in start.iter().zip(count).zip(&self.dims) {
            match s.checked_add(*c) {
                Some(end) if end <= *d => {}
                _ => bail!("hyperslab [{}, {}+{}) outside dimension {}", s, s, c, d),
            }
        }
        self.selection = Some(Hyperslab {
            start: start.to_vec(),
            count: count.to_vec(),
        });
        Ok(())
    }

    /// The selected region, or the whole space if nothing was selected.
    pub fn selection(&self) -> Hyperslab {
        match &self.selection {
            Some(slab) => slab.clone(),
            None => Hyperslab::whole(&self.dims),
        }
    }
}

impl fmt::Display for Dataspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rank={} dims={:?} max=[", self.rank(), self.dims)?;
        for (i, m) in self.max_dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match m {
                Some(m) => write!(f, "{}", m)?,
                None => write!(f, "unlimited")?,
            }
        }
        write!(f, "]")?;
        if let Some(slab) = &self.selection {
            write!(f, " select start={:?} count={:?}", slab.start, slab.count)?;
        }
        Ok(())
    }
}
