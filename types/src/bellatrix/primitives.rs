use ethereum_types::U256;
use ssz_types::VariableList;

use crate::preset::Preset;

pub type Difficulty = U256;
pub type Wei = U256;

pub type Transaction<P> = VariableList<u8, <P as Preset>::MaxBytesPerTransaction>;
