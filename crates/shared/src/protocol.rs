//! ChaosCoin call surface: human-readable interface description, verification, and ABI codec.

use std::{collections::HashMap, fmt};

use alloy_primitives::{keccak256, Address, Bytes, Selector, U256};
use thiserror::Error;

/// Human-readable interface of the ChaosCoin contract.
pub const CHAOS_COIN_ABI: &[&str] = &[
    "function requestChaos() external",
    "function optInToChaos() external",
    "function executeChaosBatch() external",
    "function transfer(address to, uint256 amount) external returns (bool)",
    "function transferFrom(address from, address to, uint256 amount) external returns (bool)",
    "function balanceOf(address account) external view returns (uint256)",
    "function optedIn(address) external view returns (bool)",
    "function lastExecuted() external view returns (uint256)",
    "function chaosExecuted() external view returns (bool)",
];

const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];
const PANIC_SELECTOR: [u8; 4] = [0x4e, 0x48, 0x7b, 0x71];
const WORD: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbiType {
    Address,
    Uint256,
    Bool,
}

impl AbiType {
    fn parse(raw: &str) -> Result<Self, InterfaceError> {
        match raw {
            "address" => Ok(Self::Address),
            "uint256" | "uint" => Ok(Self::Uint256),
            "bool" => Ok(Self::Bool),
            other => Err(InterfaceError::UnsupportedType(other.to_string())),
        }
    }

    pub fn canonical(self) -> &'static str {
        match self {
            Self::Address => "address",
            Self::Uint256 => "uint256",
            Self::Bool => "bool",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mutability {
    View,
    NonPayable,
}

/// Every contract function this crate knows how to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContractFunction {
    RequestChaos,
    OptInToChaos,
    ExecuteChaosBatch,
    Transfer,
    TransferFrom,
    BalanceOf,
    OptedIn,
    LastExecuted,
    ChaosExecuted,
}

impl ContractFunction {
    pub const ALL: [ContractFunction; 9] = [
        Self::RequestChaos,
        Self::OptInToChaos,
        Self::ExecuteChaosBatch,
        Self::Transfer,
        Self::TransferFrom,
        Self::BalanceOf,
        Self::OptedIn,
        Self::LastExecuted,
        Self::ChaosExecuted,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::RequestChaos => "requestChaos",
            Self::OptInToChaos => "optInToChaos",
            Self::ExecuteChaosBatch => "executeChaosBatch",
            Self::Transfer => "transfer",
            Self::TransferFrom => "transferFrom",
            Self::BalanceOf => "balanceOf",
            Self::OptedIn => "optedIn",
            Self::LastExecuted => "lastExecuted",
            Self::ChaosExecuted => "chaosExecuted",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|function| function.name() == name)
    }

    /// The shape the typed call surface relies on.
    fn expected_shape(self) -> FunctionShape {
        use AbiType::{Address as A, Bool as B, Uint256 as U};
        let (inputs, output, mutability) = match self {
            Self::RequestChaos | Self::OptInToChaos | Self::ExecuteChaosBatch => {
                (vec![], None, Mutability::NonPayable)
            }
            Self::Transfer => (vec![A, U], Some(B), Mutability::NonPayable),
            Self::TransferFrom => (vec![A, A, U], Some(B), Mutability::NonPayable),
            Self::BalanceOf => (vec![A], Some(U), Mutability::View),
            Self::OptedIn => (vec![A], Some(B), Mutability::View),
            Self::LastExecuted => (vec![], Some(U), Mutability::View),
            Self::ChaosExecuted => (vec![], Some(B), Mutability::View),
        };
        FunctionShape {
            inputs,
            output,
            mutability,
        }
    }
}

impl fmt::Display for ContractFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FunctionShape {
    inputs: Vec<AbiType>,
    output: Option<AbiType>,
    mutability: Mutability,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSpec {
    pub name: String,
    pub inputs: Vec<AbiType>,
    pub output: Option<AbiType>,
    pub mutability: Mutability,
}

impl FunctionSpec {
    /// Parses `function name(type [name], ...) external [view|pure] [returns (type)]`.
    pub fn parse(line: &str) -> Result<Self, InterfaceError> {
        let malformed = || InterfaceError::Malformed(line.to_string());
        let body = line.trim().strip_prefix("function ").ok_or_else(malformed)?;
        let (name, rest) = body.split_once('(').ok_or_else(malformed)?;
        let (params, modifiers) = rest.split_once(')').ok_or_else(malformed)?;
        let name = name.trim();
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(malformed());
        }

        let inputs = parse_type_list(params)?;

        let mut mutability = Mutability::NonPayable;
        let mut output = None;
        let mut tokens = modifiers.split_whitespace();
        while let Some(token) = tokens.next() {
            match token {
                "external" | "public" => {}
                "view" | "pure" => mutability = Mutability::View,
                "returns" => {
                    let returns = tokens.collect::<Vec<_>>().join(" ");
                    let returns = returns
                        .strip_prefix('(')
                        .and_then(|r| r.strip_suffix(')'))
                        .ok_or_else(malformed)?;
                    let mut types = parse_type_list(returns)?;
                    if types.len() > 1 {
                        return Err(InterfaceError::UnsupportedType(returns.to_string()));
                    }
                    output = types.pop();
                    break;
                }
                _ => return Err(malformed()),
            }
        }

        Ok(Self {
            name: name.to_string(),
            inputs,
            output,
            mutability,
        })
    }

    pub fn signature(&self) -> String {
        let inputs = self
            .inputs
            .iter()
            .map(|ty| ty.canonical())
            .collect::<Vec<_>>()
            .join(",");
        format!("{}({inputs})", self.name)
    }

    pub fn selector(&self) -> Selector {
        Selector::from_slice(&keccak256(self.signature().as_bytes())[..4])
    }

    fn shape(&self) -> FunctionShape {
        FunctionShape {
            inputs: self.inputs.clone(),
            output: self.output,
            mutability: self.mutability,
        }
    }
}

fn parse_type_list(raw: &str) -> Result<Vec<AbiType>, InterfaceError> {
    raw.split(',')
        .map(str::trim)
        .filter(|param| !param.is_empty())
        .map(|param| {
            let ty = param.split_whitespace().next().unwrap_or(param);
            AbiType::parse(ty)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterfaceError {
    #[error("malformed function description {0:?}")]
    Malformed(String),
    #[error("unsupported abi type {0:?}")]
    UnsupportedType(String),
    #[error("function {0} is described more than once")]
    Duplicate(String),
    #[error("selector {selector} is shared by {first} and {second}")]
    SelectorCollision {
        selector: Selector,
        first: String,
        second: String,
    },
    #[error("interface is missing {0}")]
    Missing(ContractFunction),
    #[error("{function} is described as {found}, expected {expected}")]
    Mismatch {
        function: ContractFunction,
        expected: String,
        found: String,
    },
    #[error("arguments for {function} do not match its description")]
    Arguments { function: ContractFunction },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbiDecodeError {
    #[error("{function} returned {len} bytes, expected at least 32")]
    Short { function: ContractFunction, len: usize },
    #[error("{function} returned a non-canonical {ty} word")]
    Invalid {
        function: ContractFunction,
        ty: &'static str,
    },
    #[error("{function} has no return value")]
    NoOutput { function: ContractFunction },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbiValue {
    Address(Address),
    Uint(U256),
    Bool(bool),
}

impl AbiValue {
    fn abi_type(&self) -> AbiType {
        match self {
            Self::Address(_) => AbiType::Address,
            Self::Uint(_) => AbiType::Uint256,
            Self::Bool(_) => AbiType::Bool,
        }
    }

    fn to_word(self) -> [u8; WORD] {
        match self {
            Self::Address(address) => address.into_word().0,
            Self::Uint(value) => value.to_be_bytes::<WORD>(),
            Self::Bool(flag) => U256::from(u8::from(flag)).to_be_bytes::<WORD>(),
        }
    }

    pub fn as_uint(&self) -> Option<U256> {
        match self {
            Self::Uint(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(flag) => Some(*flag),
            _ => None,
        }
    }
}

/// A fully typed call against the ChaosCoin interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractCall {
    RequestChaos,
    OptInToChaos,
    ExecuteChaosBatch,
    Transfer {
        to: Address,
        amount: U256,
    },
    BalanceOf(Address),
    OptedIn(Address),
    LastExecuted,
    ChaosExecuted,
}

impl ContractCall {
    pub fn function(&self) -> ContractFunction {
        match self {
            Self::RequestChaos => ContractFunction::RequestChaos,
            Self::OptInToChaos => ContractFunction::OptInToChaos,
            Self::ExecuteChaosBatch => ContractFunction::ExecuteChaosBatch,
            Self::Transfer { .. } => ContractFunction::Transfer,
            Self::BalanceOf(_) => ContractFunction::BalanceOf,
            Self::OptedIn(_) => ContractFunction::OptedIn,
            Self::LastExecuted => ContractFunction::LastExecuted,
            Self::ChaosExecuted => ContractFunction::ChaosExecuted,
        }
    }

    fn args(&self) -> Vec<AbiValue> {
        match *self {
            Self::Transfer { to, amount } => vec![AbiValue::Address(to), AbiValue::Uint(amount)],
            Self::BalanceOf(account) | Self::OptedIn(account) => vec![AbiValue::Address(account)],
            Self::RequestChaos
            | Self::OptInToChaos
            | Self::ExecuteChaosBatch
            | Self::LastExecuted
            | Self::ChaosExecuted => Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct BoundFunction {
    spec: FunctionSpec,
    selector: Selector,
}

/// A verified interface description. Every known function is present with the shape the
/// typed call surface expects; lookups after construction never touch strings.
#[derive(Debug, Clone)]
pub struct ContractInterface {
    functions: HashMap<ContractFunction, BoundFunction>,
}

impl ContractInterface {
    pub fn chaos_coin() -> Result<Self, InterfaceError> {
        Self::parse(CHAOS_COIN_ABI)
    }

    pub fn parse(lines: &[&str]) -> Result<Self, InterfaceError> {
        let mut functions = HashMap::new();
        let mut selectors: HashMap<Selector, String> = HashMap::new();

        for line in lines {
            let spec = FunctionSpec::parse(line)?;
            let selector = spec.selector();
            if let Some(first) = selectors.insert(selector, spec.signature()) {
                return Err(if first == spec.signature() {
                    InterfaceError::Duplicate(first)
                } else {
                    InterfaceError::SelectorCollision {
                        selector,
                        first,
                        second: spec.signature(),
                    }
                });
            }

            // Functions outside the known surface are tolerated and ignored.
            let Some(function) = ContractFunction::from_name(&spec.name) else {
                continue;
            };
            let expected = function.expected_shape();
            if spec.shape() != expected {
                return Err(InterfaceError::Mismatch {
                    function,
                    expected: describe(function, &expected),
                    found: describe(function, &spec.shape()),
                });
            }
            if functions
                .insert(function, BoundFunction { spec, selector })
                .is_some()
            {
                return Err(InterfaceError::Duplicate(function.name().to_string()));
            }
        }

        Ok(Self { functions })
    }

    /// Confirms the description covers `required`. Called once when a proxy is bound.
    pub fn ensure_supports(&self, required: &[ContractFunction]) -> Result<(), InterfaceError> {
        match required.iter().find(|f| !self.functions.contains_key(f)) {
            Some(missing) => Err(InterfaceError::Missing(*missing)),
            None => Ok(()),
        }
    }

    pub fn selector(&self, function: ContractFunction) -> Option<Selector> {
        self.functions.get(&function).map(|bound| bound.selector)
    }

    pub fn encode(&self, call: &ContractCall) -> Result<Bytes, InterfaceError> {
        let function = call.function();
        let bound = self
            .functions
            .get(&function)
            .ok_or(InterfaceError::Missing(function))?;
        let args = call.args();
        if args.len() != bound.spec.inputs.len()
            || args
                .iter()
                .zip(&bound.spec.inputs)
                .any(|(arg, ty)| arg.abi_type() != *ty)
        {
            return Err(InterfaceError::Arguments { function });
        }

        let mut data = Vec::with_capacity(4 + WORD * args.len());
        data.extend_from_slice(bound.selector.as_slice());
        for arg in args {
            data.extend_from_slice(&arg.to_word());
        }
        Ok(Bytes::from(data))
    }

    pub fn decode_output(
        &self,
        function: ContractFunction,
        data: &[u8],
    ) -> Result<AbiValue, AbiDecodeError> {
        let output = self
            .functions
            .get(&function)
            .and_then(|bound| bound.spec.output)
            .ok_or(AbiDecodeError::NoOutput { function })?;
        if data.len() < WORD {
            return Err(AbiDecodeError::Short {
                function,
                len: data.len(),
            });
        }
        let word = &data[..WORD];
        match output {
            AbiType::Uint256 => Ok(AbiValue::Uint(U256::from_be_slice(word))),
            AbiType::Bool => match (word[..WORD - 1].iter().all(|b| *b == 0), word[WORD - 1]) {
                (true, 0) => Ok(AbiValue::Bool(false)),
                (true, 1) => Ok(AbiValue::Bool(true)),
                _ => Err(AbiDecodeError::Invalid { function, ty: "bool" }),
            },
            AbiType::Address => {
                if word[..12].iter().any(|b| *b != 0) {
                    return Err(AbiDecodeError::Invalid {
                        function,
                        ty: "address",
                    });
                }
                Ok(AbiValue::Address(Address::from_slice(&word[12..])))
            }
        }
    }
}

fn describe(function: ContractFunction, shape: &FunctionShape) -> String {
    let inputs = shape
        .inputs
        .iter()
        .map(|ty| ty.canonical())
        .collect::<Vec<_>>()
        .join(",");
    let view = match shape.mutability {
        Mutability::View => " view",
        Mutability::NonPayable => "",
    };
    match shape.output {
        Some(output) => format!("{function}({inputs}){view} returns ({})", output.canonical()),
        None => format!("{function}({inputs}){view}"),
    }
}

/// Extracts a readable reason from revert data (`Error(string)` or `Panic(uint256)`).
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    let (selector, payload) = (data.get(..4)?, data.get(4..)?);
    if selector == PANIC_SELECTOR {
        let code = u64::try_from(U256::from_be_slice(payload.get(..WORD)?)).ok()?;
        return Some(format!("panic code {code:#x}"));
    }
    if selector != ERROR_STRING_SELECTOR {
        return None;
    }

    let offset = usize::try_from(U256::from_be_slice(payload.get(..WORD)?)).ok()?;
    let len_end = offset.checked_add(WORD)?;
    let len = usize::try_from(U256::from_be_slice(payload.get(offset..len_end)?)).ok()?;
    let bytes = payload.get(len_end..len_end.checked_add(len)?)?;
    Some(String::from_utf8_lossy(bytes).into_owned())
}
