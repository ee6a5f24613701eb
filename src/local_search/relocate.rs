//! Relocate neighborhood for local search.

use super::LocalSearch;

impl LocalSearch {
    /// Move customer `u` directly after `v`, or in front of `v` when `v`
    /// opens its route.
    pub fn relocate_move(&mut self, u: usize, v: usize) -> bool {
        if self.relocate_after(u, v) {
            return true;
        }
        self.position_of[v] == 0 && self.relocate_before(u, v)
    }

    /// Move customer `u` into an empty route, opening a new vehicle.
    pub fn relocate_to_empty_route(&mut self, u: usize) -> bool {
        let ru = self.route_of[u];
        if self.routes[ru].customers.len() <= 1 {
            return false;
        }

        let empty = match self.routes.iter().position(|r| r.customers.is_empty()) {
            Some(idx) => idx,
            None => return false,
        };

        let mut new_ru = self.routes[ru].customers.clone();
        new_ru.remove(self.position_of[u]);

        self.apply_if_improving(ru, new_ru, empty, Some(vec![u]))
    }

    fn relocate_after(&mut self, u: usize, v: usize) -> bool {
        let (ru, rv) = (self.route_of[u], self.route_of[v]);
        let (pu, pv) = (self.position_of[u], self.position_of[v]);

        if ru == rv {
            // Already in place
            if pu == pv + 1 {
                return false;
            }
            let mut route = self.routes[ru].customers.clone();
            route.remove(pu);
            let target = if pu < pv { pv } else { pv + 1 };
            route.insert(target, u);
            return self.apply_if_improving(ru, route, ru, None);
        }

        let mut new_ru = self.routes[ru].customers.clone();
        new_ru.remove(pu);
        let mut new_rv = self.routes[rv].customers.clone();
        new_rv.insert(pv + 1, u);

        self.apply_if_improving(ru, new_ru, rv, Some(new_rv))
    }

    fn relocate_before(&mut self, u: usize, v: usize) -> bool {
        let (ru, rv) = (self.route_of[u], self.route_of[v]);
        let pu = self.position_of[u];

        if ru == rv {
            // `v` is first in the route, so `u` lies behind it.
            let mut route = self.routes[ru].customers.clone();
            route.remove(pu);
            route.insert(0, u);
            return self.apply_if_improving(ru, route, ru, None);
        }

        let mut new_ru = self.routes[ru].customers.clone();
        new_ru.remove(pu);
        let mut new_rv = self.routes[rv].customers.clone();
        new_rv.insert(0, u);

        self.apply_if_improving(ru, new_ru, rv, Some(new_rv))
    }
}
